//! Extraction data model: formats, sections, statuses.

use serde::Serialize;

/// Placeholder text returned for file types no extractor handles.
pub const UNSUPPORTED_TEXT: &str = "Unsupported file type.";

/// Document formats the extractors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    SlideDeck,
    Spreadsheet,
}

impl DocumentFormat {
    /// Detect the format from the text after a filename's last `.`
    /// (case-insensitive). A name without a dot is taken whole, so `pdf`
    /// and `.pdf` both route to the PDF extractor.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(DocumentFormat::Pdf),
            "ppt" | "pptx" => Some(DocumentFormat::SlideDeck),
            "xls" | "xlsx" => Some(DocumentFormat::Spreadsheet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::SlideDeck => "slide_deck",
            DocumentFormat::Spreadsheet => "spreadsheet",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One labeled block of output text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Header line, e.g. `--- Page 2 Text ---`.
    pub header: String,
    pub body: String,
}

impl Section {
    pub fn new(header: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            body: body.into(),
        }
    }

    pub fn page_text(page: u32, body: impl Into<String>) -> Self {
        Self::new(format!("--- Page {} Text ---", page), body)
    }

    pub fn page_image_ocr(page: u32, ordinal: u32, body: impl Into<String>) -> Self {
        Self::new(format!("--- Page {} Image {} OCR ---", page, ordinal), body)
    }

    pub fn slide(slide: u32, body: impl Into<String>) -> Self {
        Self::new(format!("--- Slide {} ---", slide), body)
    }

    pub fn sheet(name: &str, body: impl Into<String>) -> Self {
        Self::new(format!("--- Sheet: {} ---", name), body)
    }
}

/// Something that went wrong while extracting, without stopping extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-based page/slide/sheet index, if the problem is tied to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<u32>,
    /// 1-based image ordinal within the unit, for OCR problems.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<u32>,
    pub cause: String,
}

impl Diagnostic {
    pub fn unit(unit: u32, cause: impl Into<String>) -> Self {
        Self {
            unit: Some(unit),
            image: None,
            cause: cause.into(),
        }
    }

    pub fn image(unit: u32, image: u32, cause: impl Into<String>) -> Self {
        Self {
            unit: Some(unit),
            image: Some(image),
            cause: cause.into(),
        }
    }
}

/// How clean an extraction was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Every unit and image was read.
    Complete,
    /// Some units or images failed; the rest is in the text.
    Partial,
    /// The container itself could not be read.
    Failed { cause: String },
    /// No extractor handles this file type.
    Unsupported,
}

/// Output of one extraction call.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<DocumentFormat>,
    pub status: ExtractionStatus,
    /// Number of structural units walked (pages, slides, sheets).
    pub units: u32,
    pub sections: Vec<Section>,
    pub diagnostics: Vec<Diagnostic>,
    /// Rendered, normalized text.
    pub text: String,
}

impl Extraction {
    /// The result for a file type nobody handles.
    pub fn unsupported() -> Self {
        Self {
            format: None,
            status: ExtractionStatus::Unsupported,
            units: 0,
            sections: Vec::new(),
            diagnostics: Vec::new(),
            text: UNSUPPORTED_TEXT.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == ExtractionStatus::Complete
    }

    pub fn is_degraded(&self) -> bool {
        matches!(
            self.status,
            ExtractionStatus::Partial | ExtractionStatus::Failed { .. }
        )
    }
}

/// Accumulates sections and diagnostics while an extractor walks a document.
#[derive(Debug)]
pub struct ExtractionBuilder {
    format: DocumentFormat,
    units: u32,
    sections: Vec<Section>,
    diagnostics: Vec<Diagnostic>,
    failure: Option<String>,
}

impl ExtractionBuilder {
    pub fn new(format: DocumentFormat) -> Self {
        Self {
            format,
            units: 0,
            sections: Vec::new(),
            diagnostics: Vec::new(),
            failure: None,
        }
    }

    /// Record that one more structural unit was visited.
    pub fn visit_unit(&mut self) {
        self.units += 1;
    }

    pub fn push_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Mark the whole container as unreadable. Sections gathered so far are kept.
    pub fn fail(&mut self, cause: impl Into<String>) {
        self.failure = Some(cause.into());
    }

    pub fn finish(self) -> Extraction {
        let status = match self.failure {
            Some(cause) => ExtractionStatus::Failed { cause },
            None if self.diagnostics.is_empty() => ExtractionStatus::Complete,
            None => ExtractionStatus::Partial,
        };
        let text = render_sections(&self.sections);
        Extraction {
            format: Some(self.format),
            status,
            units: self.units,
            sections: self.sections,
            diagnostics: self.diagnostics,
            text,
        }
    }
}

/// Join sections into the final text stream.
///
/// Tabs become single spaces here, once, over the joined output.
pub fn render_sections(sections: &[Section]) -> String {
    let mut lines: Vec<&str> = Vec::with_capacity(sections.len() * 2);
    for section in sections {
        lines.push(&section.header);
        lines.push(&section.body);
    }
    lines.join("\n").replace('\t', " ")
}
