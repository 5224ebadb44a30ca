//! docflow - document text extraction with OCR.
//!
//! The extraction core lives in [`extract`] and [`ocr`]:
//! [`extract::DocumentExtractor`] routes a file to the PDF, slide-deck or
//! spreadsheet extractor, which walk their documents page by page (slide by
//! slide, sheet by sheet) and send embedded images through
//! [`ocr::OcrFanout`]. [`services::DocumentPipeline`] wraps the core with
//! topic extraction ([`llm`]) and artifact storage ([`storage`]).

pub mod config;
pub mod extract;
pub mod llm;
pub mod ocr;
pub mod services;
pub mod storage;
