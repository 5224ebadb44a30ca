//! Slide-deck (PPTX) text and picture extraction.
//!
//! A deck is a zip package. Slide order comes from the presentation part's
//! slide id list; each slide's top-level shapes give text boxes and
//! pictures, with picture bytes resolved through the slide's relationships.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use super::error::ExtractError;
use super::types::{Diagnostic, DocumentFormat, Extraction, ExtractionBuilder, Section};
use super::FormatExtractor;
use crate::ocr::{EmbeddedImage, OcrFanout};

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// Compound-file magic of legacy binary Office documents.
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// A top-level shape of a slide, in tree order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    Text(String),
    /// Relationship id of the picture's image part.
    Picture(String),
}

/// A slide item after pictures have been given ordinals.
#[derive(Debug)]
enum SlideLine {
    Text(String),
    Picture(u32),
}

#[derive(Debug)]
struct SlideContent {
    number: u32,
    lines: Result<Vec<SlideLine>, ExtractError>,
    /// Picture bytes by ordinal.
    images: Vec<(u32, Result<Vec<u8>, ExtractError>)>,
}

/// Extracts shape text (and optionally picture OCR) from slide decks.
pub struct SlideExtractor {
    ocr: Arc<OcrFanout>,
}

impl SlideExtractor {
    pub fn new(ocr: Arc<OcrFanout>) -> Self {
        Self { ocr }
    }

    pub async fn extract(&self, content: &[u8], scan_images: bool) -> Extraction {
        let mut builder = ExtractionBuilder::new(DocumentFormat::SlideDeck);

        let owned = content.to_vec();
        let slides = match tokio::task::spawn_blocking(move || read_deck(&owned, scan_images))
            .await
        {
            Ok(Ok(slides)) => slides,
            Ok(Err(e)) => {
                tracing::warn!("PPTX Extraction Error: {}", e);
                builder.fail(format!("PPTX Extraction Error: {}", e));
                return builder.finish();
            }
            Err(e) => {
                tracing::error!("Slide reader task failed: {}", e);
                builder.fail(format!("PPTX Extraction Error: {}", e));
                return builder.finish();
            }
        };

        for slide in slides {
            builder.visit_unit();

            let lines = match slide.lines {
                Ok(lines) => lines,
                Err(e) => {
                    tracing::warn!("Could not read slide {}: {}", slide.number, e);
                    builder.push_diagnostic(Diagnostic::unit(slide.number, e.to_string()));
                    continue;
                }
            };

            let mut batch = Vec::new();
            for (ordinal, image) in slide.images {
                match image {
                    Ok(bytes) => batch.push(EmbeddedImage::new(slide.number, ordinal, bytes)),
                    Err(e) => builder.push_diagnostic(Diagnostic::image(
                        slide.number,
                        ordinal,
                        e.to_string(),
                    )),
                }
            }

            let mut recognized: HashMap<u32, String> = HashMap::new();
            for outcome in self.ocr.recognize_all(batch).await {
                if let Err(ref e) = outcome.result {
                    builder.push_diagnostic(Diagnostic::image(
                        outcome.unit,
                        outcome.ordinal,
                        e.to_string(),
                    ));
                } else if let Some(text) = outcome.text() {
                    recognized.insert(outcome.ordinal, text.to_string());
                }
            }

            let rendered: Vec<String> = lines
                .into_iter()
                .filter_map(|line| match line {
                    SlideLine::Text(text) => Some(text),
                    SlideLine::Picture(ordinal) => recognized
                        .remove(&ordinal)
                        .map(|text| format!("OCR Image Text: {}", text)),
                })
                .collect();

            if !rendered.is_empty() {
                builder.push_section(Section::slide(slide.number, rendered.join("\n")));
            }
        }

        builder.finish()
    }
}

#[async_trait]
impl FormatExtractor for SlideExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::SlideDeck
    }

    async fn extract(&self, content: &[u8], scan_images: bool) -> Extraction {
        SlideExtractor::extract(self, content, scan_images).await
    }
}

fn read_deck(content: &[u8], scan_images: bool) -> Result<Vec<SlideContent>, ExtractError> {
    if content.starts_with(&OLE_MAGIC) {
        return Err(ExtractError::LegacyFormat("ppt".to_string()));
    }

    let mut archive = ZipArchive::new(Cursor::new(content))?;
    let paths = slide_paths(&mut archive)?;
    tracing::debug!("Deck has {} slide(s)", paths.len());

    let slides = paths
        .iter()
        .enumerate()
        .map(|(idx, path)| {
            let number = idx as u32 + 1;
            match read_slide(&mut archive, path, scan_images) {
                Ok((lines, images)) => SlideContent {
                    number,
                    lines: Ok(lines),
                    images,
                },
                Err(e) => SlideContent {
                    number,
                    lines: Err(e),
                    images: Vec::new(),
                },
            }
        })
        .collect();

    Ok(slides)
}

/// Read a package part as a string, or `None` if the part does not exist.
fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ExtractError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

fn read_binary_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Err(ExtractError::MissingPart(name.to_string())),
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)?;
    Ok(data)
}

/// Slide part names in presentation order.
fn slide_paths<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>, ExtractError> {
    let presentation = read_part(archive, PRESENTATION_PART)?;
    let rels = read_part(archive, PRESENTATION_RELS)?;

    if let (Some(presentation), Some(rels)) = (presentation, rels) {
        let ids = parse_slide_ids(&presentation)?;
        let targets = parse_relationships(&rels)?;
        let ordered: Vec<String> = ids
            .iter()
            .filter_map(|id| targets.get(id))
            .map(|target| resolve_target("ppt", target))
            .collect();
        if !ordered.is_empty() {
            return Ok(ordered);
        }
    }

    tracing::debug!("No slide list in presentation part, falling back to part names");
    let mut numbered: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered.into_iter().map(|(_, name)| name).collect())
}

fn read_slide<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
    scan_images: bool,
) -> Result<(Vec<SlideLine>, Vec<(u32, Result<Vec<u8>, ExtractError>)>), ExtractError> {
    let xml = read_part(archive, path)?.ok_or_else(|| ExtractError::MissingPart(path.to_string()))?;
    let shapes = parse_shapes(&xml)?;

    let (dir, file) = path.rsplit_once('/').unwrap_or(("", path));
    let rels = if scan_images && shapes.iter().any(|s| matches!(s, Shape::Picture(_))) {
        let rels_path = format!("{}/_rels/{}.rels", dir, file);
        match read_part(archive, &rels_path)? {
            Some(xml) => parse_relationships(&xml)?,
            None => HashMap::new(),
        }
    } else {
        HashMap::new()
    };

    let mut lines = Vec::with_capacity(shapes.len());
    let mut images = Vec::new();
    let mut ordinal = 0;
    for shape in shapes {
        match shape {
            Shape::Text(text) => lines.push(SlideLine::Text(text)),
            Shape::Picture(_) if !scan_images => {}
            Shape::Picture(rid) => {
                ordinal += 1;
                let data = match rels.get(&rid) {
                    Some(target) => read_binary_part(archive, &resolve_target(dir, target)),
                    None => Err(ExtractError::MissingPart(format!(
                        "relationship {} of {}",
                        rid, path
                    ))),
                };
                lines.push(SlideLine::Picture(ordinal));
                images.push((ordinal, data));
            }
        }
    }

    Ok((lines, images))
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn local_name(e: &BytesStart<'_>) -> Vec<u8> {
    e.local_name().as_ref().to_vec()
}

/// Value of the first attribute whose local name matches, optionally
/// requiring a namespace prefix.
fn attribute(
    e: &BytesStart<'_>,
    name: &[u8],
    prefixed: bool,
) -> Result<Option<String>, ExtractError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == name && attr.key.prefix().is_some() == prefixed {
            let value = attr.unescape_value().map_err(quick_xml::Error::from)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Relationship ids of the slides listed in `p:sldIdLst`, in order.
fn parse_slide_ids(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut ids = Vec::new();
    let mut in_list = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.local_name().as_ref() == b"sldIdLst" => in_list = true,
            Event::End(ref e) if e.local_name().as_ref() == b"sldIdLst" => in_list = false,
            Event::Start(ref e) | Event::Empty(ref e)
                if in_list && e.local_name().as_ref() == b"sldId" =>
            {
                if let Some(rid) = attribute(e, b"id", true)? {
                    ids.push(rid);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(ids)
}

/// Internal relationships of a part: id to target.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let external =
                    attribute(e, b"TargetMode", false)?.as_deref() == Some("External");
                if let (false, Some(id), Some(target)) = (
                    external,
                    attribute(e, b"Id", false)?,
                    attribute(e, b"Target", false)?,
                ) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

/// State of the top-level shape being read.
enum ShapeState {
    Text {
        depth: usize,
        paragraphs: Vec<String>,
        current: Option<String>,
    },
    Picture {
        depth: usize,
        rid: Option<String>,
    },
}

/// Top-level text and picture shapes of a slide's shape tree, in tree order.
fn parse_shapes(xml: &str) -> Result<Vec<Shape>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut shape: Option<ShapeState> = None;
    let mut shapes = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let name = local_name(e);
                if shape.is_none() && stack.last().map(Vec::as_slice) == Some(b"spTree".as_slice()) {
                    let depth = stack.len();
                    shape = match name.as_slice() {
                        b"sp" => Some(ShapeState::Text {
                            depth,
                            paragraphs: Vec::new(),
                            current: None,
                        }),
                        b"pic" => Some(ShapeState::Picture { depth, rid: None }),
                        _ => None,
                    };
                } else {
                    start_in_shape(&mut shape, &name, e)?;
                }
                stack.push(name);
            }
            Event::Empty(ref e) => {
                let name = local_name(e);
                empty_in_shape(&mut shape, &name, e)?;
            }
            Event::Text(ref e) => {
                if let Some(ShapeState::Text {
                    current: Some(ref mut paragraph),
                    ..
                }) = shape
                {
                    if stack.last().map(Vec::as_slice) == Some(b"t".as_slice()) {
                        let text = e.unescape().map_err(quick_xml::Error::from)?;
                        paragraph.push_str(&text);
                    }
                }
            }
            Event::CData(ref e) => {
                if let Some(ShapeState::Text {
                    current: Some(ref mut paragraph),
                    ..
                }) = shape
                {
                    if stack.last().map(Vec::as_slice) == Some(b"t".as_slice()) {
                        paragraph.push_str(&String::from_utf8_lossy(e));
                    }
                }
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                let depth = stack.len();
                match shape {
                    Some(ShapeState::Text {
                        ref mut paragraphs,
                        ref mut current,
                        ..
                    }) if name == b"p" => {
                        if let Some(paragraph) = current.take() {
                            paragraphs.push(paragraph);
                        }
                    }
                    _ => {}
                }
                if shape_depth(&shape) == Some(depth) {
                    if let Some(done) = shape.take().and_then(finish_shape) {
                        shapes.push(done);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(shapes)
}

fn shape_depth(shape: &Option<ShapeState>) -> Option<usize> {
    match shape {
        Some(ShapeState::Text { depth, .. }) | Some(ShapeState::Picture { depth, .. }) => {
            Some(*depth)
        }
        None => None,
    }
}

fn start_in_shape(
    shape: &mut Option<ShapeState>,
    name: &[u8],
    e: &BytesStart<'_>,
) -> Result<(), ExtractError> {
    match shape {
        Some(ShapeState::Text { current, .. }) if name == b"p" => {
            *current = Some(String::new());
        }
        Some(ShapeState::Picture { rid, .. }) if name == b"blip" && rid.is_none() => {
            *rid = attribute(e, b"embed", true)?;
        }
        _ => {}
    }
    Ok(())
}

fn empty_in_shape(
    shape: &mut Option<ShapeState>,
    name: &[u8],
    e: &BytesStart<'_>,
) -> Result<(), ExtractError> {
    match shape {
        Some(ShapeState::Text {
            paragraphs,
            current,
            ..
        }) => match name {
            b"p" => paragraphs.push(String::new()),
            b"br" => {
                if let Some(paragraph) = current {
                    paragraph.push('\n');
                }
            }
            b"tab" => {
                if let Some(paragraph) = current {
                    paragraph.push('\t');
                }
            }
            _ => {}
        },
        Some(ShapeState::Picture { rid, .. }) if name == b"blip" && rid.is_none() => {
            *rid = attribute(e, b"embed", true)?;
        }
        _ => {}
    }
    Ok(())
}

fn finish_shape(state: ShapeState) -> Option<Shape> {
    match state {
        ShapeState::Text { paragraphs, .. } => {
            let text = paragraphs.join("\n");
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                Some(Shape::Text(text.to_string()))
            }
        }
        ShapeState::Picture { rid, .. } => rid.map(Shape::Picture),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
       xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
       xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
  <p:cSld><p:spTree>
    <p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>
    <p:grpSpPr/>
    <p:sp>
      <p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr>
      <p:spPr/>
      <p:txBody><a:bodyPr/><a:p><a:r><a:t>  Quarterly &amp; Annual  </a:t></a:r></a:p></p:txBody>
    </p:sp>
    <p:pic>
      <p:nvPicPr><p:cNvPr id="3" name="Picture 2"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr>
      <p:blipFill><a:blip r:embed="rId2"/></p:blipFill>
      <p:spPr/>
    </p:pic>
    <p:sp>
      <p:txBody><a:bodyPr/>
        <a:p><a:r><a:t>first</a:t></a:r><a:br/><a:r><a:t>second</a:t></a:r></a:p>
        <a:p/>
        <a:p><a:r><a:t>a</a:t></a:r><a:tab/><a:r><a:t>b</a:t></a:r></a:p>
      </p:txBody>
    </p:sp>
    <p:sp><p:txBody><a:bodyPr/><a:p><a:r><a:t>   </a:t></a:r></a:p></p:txBody></p:sp>
    <p:grpSp>
      <p:sp><p:txBody><a:p><a:r><a:t>grouped</a:t></a:r></a:p></p:txBody></p:sp>
    </p:grpSp>
  </p:spTree></p:cSld>
</p:sld>"#;

    #[test]
    fn test_parse_shapes_in_tree_order() {
        let shapes = parse_shapes(SLIDE).unwrap();
        assert_eq!(
            shapes,
            vec![
                Shape::Text("Quarterly & Annual".to_string()),
                Shape::Picture("rId2".to_string()),
                Shape::Text("first\nsecond\n\na\tb".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_slide_ids_uses_relationship_id() {
        let xml = r#"<p:presentation xmlns:p="p" xmlns:r="r">
            <p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>
            <p:sldIdLst><p:sldId id="257" r:id="rId3"/><p:sldId id="256" r:id="rId2"/></p:sldIdLst>
        </p:presentation>"#;
        assert_eq!(parse_slide_ids(xml).unwrap(), vec!["rId3", "rId2"]);
    }

    #[test]
    fn test_parse_relationships_skips_external() {
        let xml = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId1" Type="image" Target="../media/image1.png"/>
            <Relationship Id="rId2" Type="hyperlink" Target="https://example.com" TargetMode="External"/>
        </Relationships>"#;
        let rels = parse_relationships(xml).unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels["rId1"], "../media/image1.png");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("ppt/slides", "../media/image1.png"),
            "ppt/media/image1.png"
        );
        assert_eq!(resolve_target("ppt", "slides/slide2.xml"), "ppt/slides/slide2.xml");
        assert_eq!(
            resolve_target("ppt/slides", "/ppt/media/x.jpeg"),
            "ppt/media/x.jpeg"
        );
    }

    #[test]
    fn test_legacy_ppt_is_rejected() {
        let mut content = OLE_MAGIC.to_vec();
        content.extend_from_slice(&[0u8; 64]);
        let err = read_deck(&content, false).unwrap_err();
        assert!(matches!(err, ExtractError::LegacyFormat(_)));
    }

    #[test]
    fn test_garbage_is_zip_error() {
        let err = read_deck(b"not a zip", true).unwrap_err();
        assert!(matches!(err, ExtractError::Zip(_)));
    }
}
