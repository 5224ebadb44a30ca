//! Service layer for docflow.
//!
//! Services can be used by the CLI or any other front end.

pub mod pipeline;

pub use pipeline::{
    text_key_for, BatchResult, DocumentPipeline, PipelineError, PipelineEvent, ProcessedDocument,
};
