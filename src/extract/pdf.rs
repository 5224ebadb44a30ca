//! PDF text and image extraction.
//!
//! Native text comes from the page content streams. Images are the `Image`
//! XObjects reachable from each page's resources (including ones nested in
//! form XObjects). JPEG and JPEG 2000 streams pass through untouched; raw
//! sample streams are re-encoded as PNG so the OCR worker can decode them.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};

use super::error::ExtractError;
use super::types::{Diagnostic, DocumentFormat, Extraction, ExtractionBuilder, Section};
use super::FormatExtractor;
use crate::ocr::{EmbeddedImage, OcrFanout};

const MAX_TREE_DEPTH: usize = 32;
const MAX_FORM_DEPTH: usize = 8;

/// Palette fallback for out-of-range indices.
static BLACK: [u8; 4] = [0; 4];

/// Everything read from one page before OCR runs.
#[derive(Debug)]
struct PageContent {
    number: u32,
    text: Result<String, String>,
    /// Encoded images in resource order; failures keep their ordinal slot.
    images: Result<Vec<Result<Vec<u8>, ExtractError>>, ExtractError>,
}

/// Extracts text (and optionally image OCR) from PDF documents.
pub struct PdfExtractor {
    ocr: Arc<OcrFanout>,
}

impl PdfExtractor {
    pub fn new(ocr: Arc<OcrFanout>) -> Self {
        Self { ocr }
    }

    /// Extract a PDF page by page.
    ///
    /// A page that fails is recorded and skipped; an unreadable file yields
    /// `Failed` with whatever text was gathered.
    pub async fn extract(&self, content: &[u8], scan_images: bool) -> Extraction {
        let mut builder = ExtractionBuilder::new(DocumentFormat::Pdf);

        let owned = content.to_vec();
        let pages = match tokio::task::spawn_blocking(move || read_pages(&owned, scan_images))
            .await
        {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                tracing::warn!("PDF Extraction Error: {}", e);
                builder.fail(format!("PDF Extraction Error: {}", e));
                return builder.finish();
            }
            Err(e) => {
                tracing::error!("PDF reader task failed: {}", e);
                builder.fail(format!("PDF Extraction Error: {}", e));
                return builder.finish();
            }
        };

        tracing::debug!("Read {} PDF page(s)", pages.len());

        for page in pages {
            builder.visit_unit();

            match page.text {
                Ok(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        builder.push_section(Section::page_text(page.number, text));
                    }
                }
                Err(cause) => {
                    tracing::warn!("Text extraction failed on page {}: {}", page.number, cause);
                    builder.push_diagnostic(Diagnostic::unit(page.number, cause));
                }
            }

            if !scan_images {
                continue;
            }

            let images = match page.images {
                Ok(images) => images,
                Err(e) => {
                    tracing::warn!("Could not list images on page {}: {}", page.number, e);
                    builder.push_diagnostic(Diagnostic::unit(page.number, e.to_string()));
                    continue;
                }
            };

            let mut batch = Vec::with_capacity(images.len());
            for (idx, image) in images.into_iter().enumerate() {
                let ordinal = idx as u32 + 1;
                match image {
                    Ok(bytes) => batch.push(EmbeddedImage::new(page.number, ordinal, bytes)),
                    Err(e) => {
                        tracing::debug!("Skipping image {} on page {}: {}", ordinal, page.number, e);
                        builder.push_diagnostic(Diagnostic::image(
                            page.number,
                            ordinal,
                            e.to_string(),
                        ));
                    }
                }
            }

            if batch.is_empty() {
                continue;
            }

            for outcome in self.ocr.recognize_all(batch).await {
                if let Err(ref e) = outcome.result {
                    builder.push_diagnostic(Diagnostic::image(
                        outcome.unit,
                        outcome.ordinal,
                        e.to_string(),
                    ));
                } else if let Some(text) = outcome.text() {
                    builder.push_section(Section::page_image_ocr(
                        outcome.unit,
                        outcome.ordinal,
                        text,
                    ));
                }
            }
        }

        builder.finish()
    }
}

#[async_trait]
impl FormatExtractor for PdfExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    async fn extract(&self, content: &[u8], scan_images: bool) -> Extraction {
        PdfExtractor::extract(self, content, scan_images).await
    }
}

/// Parse the document and pull text (and images when asked) from every page.
fn read_pages(content: &[u8], scan_images: bool) -> Result<Vec<PageContent>, ExtractError> {
    let doc = Document::load_mem(content)?;

    let pages = doc
        .get_pages()
        .into_iter()
        .map(|(number, page_id)| {
            let text = doc.extract_text(&[number]).map_err(|e| e.to_string());
            let images = if scan_images {
                page_images(&doc, page_id)
            } else {
                Ok(Vec::new())
            };
            PageContent {
                number,
                text,
                images,
            }
        })
        .collect();

    Ok(pages)
}

/// Follow indirect references to the object they point at.
fn resolve<'a>(doc: &'a Document, mut obj: &'a Object) -> Result<&'a Object, ExtractError> {
    for _ in 0..MAX_TREE_DEPTH {
        match obj {
            Object::Reference(id) => obj = doc.get_object(*id)?,
            other => return Ok(other),
        }
    }
    Err(ExtractError::MissingPart(
        "PDF reference chain too deep".to_string(),
    ))
}

/// A page's resource dictionary, inherited from the page tree if needed.
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Option<&Dictionary>, ExtractError> {
    let mut node = doc.get_object(page_id)?.as_dict()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return Ok(Some(resolve(doc, resources)?.as_dict()?));
        }
        match node.get(b"Parent") {
            Ok(parent) => node = resolve(doc, parent)?.as_dict()?,
            Err(_) => return Ok(None),
        }
    }
    Ok(None)
}

fn page_images(
    doc: &Document,
    page_id: ObjectId,
) -> Result<Vec<Result<Vec<u8>, ExtractError>>, ExtractError> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    if let Some(resources) = page_resources(doc, page_id)? {
        collect_images(doc, resources, &mut seen, &mut images, 0)?;
    }
    Ok(images)
}

fn collect_images(
    doc: &Document,
    resources: &Dictionary,
    seen: &mut HashSet<ObjectId>,
    images: &mut Vec<Result<Vec<u8>, ExtractError>>,
    depth: usize,
) -> Result<(), ExtractError> {
    let xobjects = match resources.get(b"XObject") {
        Ok(obj) => resolve(doc, obj)?.as_dict()?,
        Err(_) => return Ok(()),
    };

    for (_, entry) in xobjects.iter() {
        let id = match entry {
            Object::Reference(id) => *id,
            _ => continue,
        };
        if !seen.insert(id) {
            continue;
        }

        let stream = match doc.get_object(id).and_then(Object::as_stream) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!("Unreadable XObject {:?}: {}", id, e);
                continue;
            }
        };

        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => images.push(encode_image(doc, &stream.dict, stream)),
            Ok(b"Form") if depth < MAX_FORM_DEPTH => {
                if let Ok(nested) = stream.dict.get(b"Resources") {
                    let nested = resolve(doc, nested)?.as_dict()?;
                    collect_images(doc, nested, seen, images, depth + 1)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Filter names of a stream, in decoding order.
fn stream_filters(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

/// How samples map to colors.
#[derive(Debug, Clone, PartialEq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    Indexed {
        base: Box<ColorModel>,
        palette: Vec<u8>,
    },
}

impl ColorModel {
    fn components(&self) -> usize {
        match self {
            ColorModel::Gray | ColorModel::Indexed { .. } => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }
}

fn color_model(doc: &Document, space: &Object) -> Result<ColorModel, ExtractError> {
    let space = resolve(doc, space)?;
    match space {
        Object::Name(name) => named_color_model(name),
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|o| o.as_name().ok())
                .ok_or_else(|| ExtractError::UnsupportedImage("empty color space".to_string()))?;
            match family {
                b"ICCBased" => {
                    let profile = items
                        .get(1)
                        .ok_or_else(|| ExtractError::UnsupportedImage("ICC profile".to_string()))?;
                    let n = resolve(doc, profile)?
                        .as_stream()?
                        .dict
                        .get(b"N")
                        .and_then(Object::as_i64)
                        .unwrap_or(3);
                    match n {
                        1 => Ok(ColorModel::Gray),
                        4 => Ok(ColorModel::Cmyk),
                        _ => Ok(ColorModel::Rgb),
                    }
                }
                b"Indexed" | b"I" => {
                    let base = items
                        .get(1)
                        .ok_or_else(|| ExtractError::UnsupportedImage("indexed base".to_string()))?;
                    let base = color_model(doc, base)?;
                    let lookup = items
                        .get(3)
                        .ok_or_else(|| ExtractError::UnsupportedImage("indexed lookup".to_string()))?;
                    let palette = match resolve(doc, lookup)? {
                        Object::String(bytes, _) => bytes.clone(),
                        Object::Stream(stream) => stream
                            .decompressed_content()
                            .unwrap_or_else(|_| stream.content.clone()),
                        _ => {
                            return Err(ExtractError::UnsupportedImage(
                                "indexed lookup table".to_string(),
                            ))
                        }
                    };
                    Ok(ColorModel::Indexed {
                        base: Box::new(base),
                        palette,
                    })
                }
                b"CalGray" => Ok(ColorModel::Gray),
                b"CalRGB" => Ok(ColorModel::Rgb),
                other => Err(ExtractError::UnsupportedImage(format!(
                    "color space {}",
                    String::from_utf8_lossy(other)
                ))),
            }
        }
        _ => Err(ExtractError::UnsupportedImage("color space".to_string())),
    }
}

fn named_color_model(name: &[u8]) -> Result<ColorModel, ExtractError> {
    match name {
        b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorModel::Gray),
        b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorModel::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(ColorModel::Cmyk),
        other => Err(ExtractError::UnsupportedImage(format!(
            "color space {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Turn an image XObject into bytes an image decoder understands.
fn encode_image(
    doc: &Document,
    dict: &Dictionary,
    stream: &lopdf::Stream,
) -> Result<Vec<u8>, ExtractError> {
    let filters = stream_filters(dict);

    if let [only] = filters.as_slice() {
        match only.as_str() {
            "DCTDecode" => return Ok(stream.content.clone()),
            // no JPEG 2000 decoder is available to the OCR backends
            "JPXDecode" => {
                return Err(ExtractError::UnsupportedImage(
                    "JPEG 2000 (JPXDecode)".to_string(),
                ))
            }
            _ => {}
        }
    }

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else if filters
        .iter()
        .all(|f| f == "FlateDecode" || f == "LZWDecode")
    {
        stream.decompressed_content()?
    } else {
        return Err(ExtractError::UnsupportedImage(filters.join("+")));
    };

    let width = dict.get(b"Width").and_then(Object::as_i64)?;
    let height = dict.get(b"Height").and_then(Object::as_i64)?;
    if width <= 0 || height <= 0 {
        return Err(ExtractError::UnsupportedImage(format!(
            "bad dimensions {}x{}",
            width, height
        )));
    }
    let (width, height) = (width as u32, height as u32);

    let image_mask = dict
        .get(b"ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false);
    let bits = if image_mask {
        1
    } else {
        dict.get(b"BitsPerComponent")
            .and_then(Object::as_i64)
            .unwrap_or(8) as u8
    };

    let color = if image_mask {
        ColorModel::Gray
    } else {
        match dict.get(b"ColorSpace") {
            Ok(space) => color_model(doc, space)?,
            Err(_) => guess_color_model(samples.len(), width, height),
        }
    };

    let image = samples_to_image(&samples, width, height, bits, &color)?;
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ExtractError::UnsupportedImage(e.to_string()))?;
    Ok(buf.into_inner())
}

fn guess_color_model(len: usize, width: u32, height: u32) -> ColorModel {
    let pixels = width as usize * height as usize;
    match len.checked_div(pixels) {
        Some(n) if n >= 4 => ColorModel::Cmyk,
        Some(3) => ColorModel::Rgb,
        _ => ColorModel::Gray,
    }
}

/// Unpack packed samples (1, 2, 4 or 8 bits) into one byte per sample.
/// Rows are padded to a byte boundary, as PDF requires.
fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    bits: u8,
    components: usize,
) -> Result<Vec<u8>, ExtractError> {
    let per_row = width as usize * components;
    let row_bytes = match bits {
        1 | 2 | 4 | 8 => (per_row * bits as usize).div_ceil(8),
        other => {
            return Err(ExtractError::UnsupportedImage(format!(
                "{} bits per component",
                other
            )))
        }
    };
    let needed = row_bytes * height as usize;
    if data.len() < needed {
        return Err(ExtractError::UnsupportedImage(format!(
            "truncated image data ({} of {} bytes)",
            data.len(),
            needed
        )));
    }
    if bits == 8 {
        return Ok(data[..needed].to_vec());
    }

    let mask = (1u16 << bits) - 1;
    let mut out = Vec::with_capacity(per_row * height as usize);
    for row in data[..needed].chunks(row_bytes) {
        for i in 0..per_row {
            let bit = i * bits as usize;
            let byte = row[bit / 8] as u16;
            let shift = 8 - bits as usize - (bit % 8);
            out.push(((byte >> shift) & mask) as u8);
        }
    }
    Ok(out)
}

fn scale_to_byte(value: u8, bits: u8) -> u8 {
    if bits >= 8 {
        return value;
    }
    let max = (1u16 << bits) - 1;
    (value as u16 * 255 / max) as u8
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let k = 255 - k as u16;
    [
        ((255 - c as u16) * k / 255) as u8,
        ((255 - m as u16) * k / 255) as u8,
        ((255 - y as u16) * k / 255) as u8,
    ]
}

fn samples_to_image(
    data: &[u8],
    width: u32,
    height: u32,
    bits: u8,
    color: &ColorModel,
) -> Result<DynamicImage, ExtractError> {
    let samples = unpack_samples(data, width, height, bits, color.components())?;
    let size_err = || ExtractError::UnsupportedImage("sample count mismatch".to_string());

    match color {
        ColorModel::Gray => {
            let gray = samples.iter().map(|&v| scale_to_byte(v, bits)).collect();
            GrayImage::from_raw(width, height, gray)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(size_err)
        }
        ColorModel::Rgb => {
            if bits != 8 {
                return Err(ExtractError::UnsupportedImage(format!(
                    "{}-bit RGB",
                    bits
                )));
            }
            RgbImage::from_raw(width, height, samples)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(size_err)
        }
        ColorModel::Cmyk => {
            if bits != 8 {
                return Err(ExtractError::UnsupportedImage(format!(
                    "{}-bit CMYK",
                    bits
                )));
            }
            let rgb = samples
                .chunks_exact(4)
                .flat_map(|px| cmyk_to_rgb(px[0], px[1], px[2], px[3]))
                .collect();
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(size_err)
        }
        ColorModel::Indexed { base, palette } => {
            if matches!(base.as_ref(), ColorModel::Indexed { .. }) {
                return Err(ExtractError::UnsupportedImage(
                    "nested indexed color space".to_string(),
                ));
            }
            let n = base.components();
            let mut rgb = Vec::with_capacity(samples.len() * 3);
            for &index in &samples {
                let start = index as usize * n;
                let entry = palette.get(start..start + n).unwrap_or(&BLACK[..n]);
                let px = match base.as_ref() {
                    ColorModel::Gray => [entry[0]; 3],
                    ColorModel::Cmyk => cmyk_to_rgb(entry[0], entry[1], entry[2], entry[3]),
                    _ => [entry[0], entry[1], entry[2]],
                };
                rgb.extend_from_slice(&px);
            }
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(size_err)
        }
    }
}
