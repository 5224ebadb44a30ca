//! Fixtures shared by the integration tests: small in-memory documents and
//! a scripted OCR backend.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use docflow::extract::DocumentExtractor;
use docflow::ocr::{OcrBackend, OcrBackendType, OcrError, OcrFanout};

/// OCR backend that "reads" an image as `img<width>`.
///
/// Widths listed in `failing` fail recognition. Each call sleeps for
/// `delay(width)` so tests can force any completion order.
pub struct ScriptedBackend {
    pub calls: AtomicUsize,
    failing: HashSet<u32>,
    delay: fn(u32) -> Duration,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: HashSet::new(),
            delay: |_| Duration::ZERO,
        }
    }

    pub fn failing_on(mut self, width: u32) -> Self {
        self.failing.insert(width);
        self
    }

    pub fn with_delay(mut self, delay: fn(u32) -> Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrBackend for ScriptedBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Tesseract
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        String::new()
    }

    fn run_ocr(&self, image: &DynamicImage) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let width = image.width();
        std::thread::sleep((self.delay)(width));
        if self.failing.contains(&width) {
            return Err(OcrError::OcrFailed(format!("cannot read img{}", width)));
        }
        Ok(format!("img{}", width))
    }
}

pub fn fanout(backend: Arc<ScriptedBackend>) -> Arc<OcrFanout> {
    Arc::new(OcrFanout::new(backend, 4))
}

pub fn extractor(backend: Arc<ScriptedBackend>) -> DocumentExtractor {
    DocumentExtractor::new(fanout(backend))
}

/// A white grayscale PNG `width` pixels wide.
pub fn png(width: u32) -> Vec<u8> {
    let img = image::GrayImage::from_pixel(width, 2, image::Luma([255u8]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// One PDF page: its text line and the widths of raw grayscale images
/// drawn on it.
pub struct PdfPage<'a> {
    pub text: &'a str,
    pub image_widths: &'a [u32],
}

/// Build a PDF with one Courier text line per page and uncompressed
/// DeviceGray image XObjects.
pub fn pdf(pages: &[PdfPage<'_>]) -> Vec<u8> {
    let (doc, _) = pdf_document(pages);
    save_pdf(doc)
}

/// Like [`pdf`], but page `broken` (1-based) has a `Resources` entry that
/// is not a dictionary.
pub fn pdf_with_broken_resources(pages: &[PdfPage<'_>], broken: usize) -> Vec<u8> {
    let (mut doc, page_ids) = pdf_document(pages);
    let page = doc
        .get_object_mut(page_ids[broken - 1])
        .and_then(Object::as_dict_mut)
        .unwrap();
    page.set("Resources", 7i64);
    save_pdf(doc)
}

fn save_pdf(mut doc: Document) -> Vec<u8> {
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn pdf_document(pages: &[PdfPage<'_>]) -> (Document, Vec<lopdf::ObjectId>) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let mut kids: Vec<Object> = Vec::new();
    let mut page_ids = Vec::new();
    for page in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(page.text)]),
            Operation::new("ET", vec![]),
        ];

        let mut xobjects = lopdf::Dictionary::new();
        for (idx, &width) in page.image_widths.iter().enumerate() {
            let name = format!("Im{}", idx + 1);
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => 2,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                vec![200u8; width as usize * 2],
            ));
            xobjects.set(name.clone(), image_id);
            operations.extend([
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        (width as i64).into(),
                        0.into(),
                        0.into(),
                        2.into(),
                        72.into(),
                        (600 - 20 * idx as i64).into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                Operation::new("Q", vec![]),
            ]);
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
        page_ids.push(page_id);
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    (doc, page_ids)
}

fn zip_package(parts: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in parts {
        writer.start_file(name.as_str(), options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// One slide: text boxes first, then pictures of the given widths.
pub struct SlideSpec<'a> {
    pub texts: &'a [&'a str],
    pub picture_widths: &'a [u32],
}

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const DOC_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Build a PPTX package. Slides are stored under reversed part names so
/// that order must come from the presentation's slide list.
pub fn pptx(slides: &[SlideSpec<'_>]) -> Vec<u8> {
    zip_package(&pptx_parts(slides))
}

/// Like [`pptx`], but the XML part of slide `missing` (1-based) is left
/// out while the slide list still names it.
pub fn pptx_missing_slide(slides: &[SlideSpec<'_>], missing: usize) -> Vec<u8> {
    let part = format!("ppt/slides/slide{}.xml", slides.len() + 1 - missing);
    let parts: Vec<(String, Vec<u8>)> = pptx_parts(slides)
        .into_iter()
        .filter(|(name, _)| *name != part)
        .collect();
    zip_package(&parts)
}

fn pptx_parts(slides: &[SlideSpec<'_>]) -> Vec<(String, Vec<u8>)> {
    let mut parts: Vec<(String, Vec<u8>)> = Vec::new();
    let mut slide_ids = String::new();
    let mut pres_rels = String::new();
    let total = slides.len();

    for (idx, slide) in slides.iter().enumerate() {
        let part_no = total - idx;
        let rid = format!("rId{}", idx + 10);
        slide_ids.push_str(&format!(r#"<p:sldId id="{}" r:id="{}"/>"#, 256 + idx, rid));
        pres_rels.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}/slide" Target="slides/slide{}.xml"/>"#,
            rid, DOC_REL, part_no
        ));

        let mut shapes = String::new();
        for text in slide.texts {
            shapes.push_str(&format!(
                r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Text"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>"#,
                text
            ));
        }
        let mut slide_rels = String::new();
        for (pic, &width) in slide.picture_widths.iter().enumerate() {
            let media = format!("ppt/media/s{}p{}.png", part_no, pic + 1);
            shapes.push_str(&format!(
                r#"<p:pic><p:nvPicPr><p:cNvPr id="3" name="Picture"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rIdImg{}"/></p:blipFill><p:spPr/></p:pic>"#,
                pic + 1
            ));
            slide_rels.push_str(&format!(
                r#"<Relationship Id="rIdImg{}" Type="{}/image" Target="../media/s{}p{}.png"/>"#,
                pic + 1,
                DOC_REL,
                part_no,
                pic + 1
            ));
            parts.push((media, png(width)));
        }

        parts.push((
            format!("ppt/slides/slide{}.xml", part_no),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="{}" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:spTree></p:cSld></p:sld>"#,
                DOC_REL, shapes
            )
            .into_bytes(),
        ));
        parts.push((
            format!("ppt/slides/_rels/slide{}.xml.rels", part_no),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}">{}</Relationships>"#,
                RELS_NS, slide_rels
            )
            .into_bytes(),
        ));
    }

    parts.push((
        "ppt/presentation.xml".to_string(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:presentation xmlns:r="{}" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:sldIdLst>{}</p:sldIdLst></p:presentation>"#,
            DOC_REL, slide_ids
        )
        .into_bytes(),
    ));
    parts.push((
        "ppt/_rels/presentation.xml.rels".to_string(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}">{}</Relationships>"#,
            RELS_NS, pres_rels
        )
        .into_bytes(),
    ));

    parts
}

/// One worksheet: a name and rows of cells. Cells that parse as numbers
/// are written as numbers, empty cells are left out, the rest are inline
/// strings.
pub struct SheetSpec<'a> {
    pub name: &'a str,
    pub rows: &'a [&'a [&'a str]],
}

fn column_letter(col: usize) -> char {
    (b'A' + col as u8) as char
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Build an XLSX workbook from sheet specs.
pub fn xlsx(sheets: &[SheetSpec<'_>]) -> Vec<u8> {
    let mut parts: Vec<(String, Vec<u8>)> = Vec::new();
    let mut sheet_entries = String::new();
    let mut workbook_rels = String::new();
    let mut overrides = String::new();

    for (idx, sheet) in sheets.iter().enumerate() {
        let n = idx + 1;
        sheet_entries.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            xml_escape(sheet.name),
            n,
            n
        ));
        workbook_rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            n, DOC_REL, n
        ));
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            n
        ));

        let mut rows = String::new();
        for (r, cells) in sheet.rows.iter().enumerate() {
            let mut row = format!(r#"<row r="{}">"#, r + 1);
            for (c, value) in cells.iter().enumerate() {
                let cell_ref = format!("{}{}", column_letter(c), r + 1);
                if value.is_empty() {
                    continue;
                }
                if value.parse::<f64>().is_ok() {
                    row.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, cell_ref, value));
                } else {
                    row.push_str(&format!(
                        r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                        cell_ref,
                        xml_escape(value)
                    ));
                }
            }
            row.push_str("</row>");
            rows.push_str(&row);
        }

        parts.push((
            format!("xl/worksheets/sheet{}.xml", n),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
                rows
            )
            .into_bytes(),
        ));
    }

    parts.push((
        "[Content_Types].xml".to_string(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>{}</Types>"#,
            overrides
        )
        .into_bytes(),
    ));
    parts.push((
        "_rels/.rels".to_string(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}"><Relationship Id="rId1" Type="{}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
            RELS_NS, DOC_REL
        )
        .into_bytes(),
    ));
    parts.push((
        "xl/workbook.xml".to_string(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{}"><sheets>{}</sheets></workbook>"#,
            DOC_REL, sheet_entries
        )
        .into_bytes(),
    ));
    parts.push((
        "xl/_rels/workbook.xml.rels".to_string(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}">{}</Relationships>"#,
            RELS_NS, workbook_rels
        )
        .into_bytes(),
    ));

    zip_package(&parts)
}
