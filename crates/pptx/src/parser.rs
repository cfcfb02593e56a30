//! PPTX picture extractor implementation.

use bgimg_core::{Error, ExtractedImage, Result, SizePolicy, SlideSize};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS_PART: &str = "ppt/_rels/presentation.xml.rels";

/// Top-level `spTree` children that count as shapes when numbering.
const SHAPE_ELEMENTS: &[&[u8]] = &[b"sp", b"grpSp", b"graphicFrame", b"cxnSp", b"pic", b"contentPart"];

/// Extracts background-sized pictures from PPTX (Office Open XML) files.
#[derive(Debug, Clone, Default)]
pub struct PptxExtractor {
    policy: SizePolicy,
}

impl PptxExtractor {
    /// Create an extractor with the default size policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different size-compatibility policy.
    pub fn with_policy(mut self, policy: SizePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Open a deck on disk and extract its background pictures.
    pub fn extract_file(&self, deck_path: &Path) -> Result<Vec<ExtractedImage>> {
        let file = File::open(deck_path)?;
        self.extract(BufReader::new(file), deck_path)
    }

    /// Extract background pictures from a PPTX read from `reader`.
    ///
    /// Pictures are returned in slide order, then shape order. Pictures whose
    /// media cannot be read are logged and skipped; only a package that cannot
    /// be opened at all is an error.
    pub fn extract<R: Read + Seek>(&self, reader: R, deck_path: &Path) -> Result<Vec<ExtractedImage>> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;

        let presentation = self
            .read_file_from_archive(&mut archive, PRESENTATION_PART)
            .map_err(|e| Error::PptxParseError(format!("Not a presentation: {}", e)))?;
        let (slide_size, slide_ids) = parse_presentation(&presentation)?;
        let slide_order = self.get_slide_order(&mut archive, &slide_ids)?;

        log::debug!(
            "{}: {} slides, canvas {}x{}",
            deck_path.display(),
            slide_order.len(),
            slide_size.width,
            slide_size.height
        );

        let mut images = Vec::new();
        for (slide_index, slide_path) in slide_order.iter().enumerate() {
            match self.extract_slide(&mut archive, slide_path, slide_index, slide_size, deck_path) {
                Ok(mut found) => images.append(&mut found),
                Err(e) => log::error!(
                    "Skipping slide {} of {}: {}",
                    slide_index + 1,
                    deck_path.display(),
                    e
                ),
            }
        }

        Ok(images)
    }

    /// Get the ordered list of slide part paths.
    ///
    /// Order follows `p:sldIdLst`; if the list is missing, slide relationships
    /// are ordered by the number in their id or target.
    fn get_slide_order<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        slide_ids: &[String],
    ) -> Result<Vec<String>> {
        let rels_content = self.read_file_from_archive(archive, PRESENTATION_RELS_PART)?;
        let relationships = parse_relationships(&rels_content)?;

        let slide_rels: Vec<&Relationship> = relationships.iter().filter(|r| r.is_slide()).collect();

        if !slide_ids.is_empty() {
            let by_id: HashMap<&str, &Relationship> =
                slide_rels.iter().map(|r| (r.id.as_str(), *r)).collect();
            return Ok(slide_ids
                .iter()
                .filter_map(|id| match by_id.get(id.as_str()) {
                    Some(rel) => Some(resolve_target("ppt", &rel.target)),
                    None => {
                        log::warn!("Slide id {} has no relationship, skipping", id);
                        None
                    }
                })
                .collect());
        }

        let mut slides: Vec<(String, Option<usize>)> = slide_rels
            .iter()
            .map(|rel| {
                let order_num = extract_slide_number(&rel.id).or_else(|| extract_slide_number(&rel.target));
                (resolve_target("ppt", &rel.target), order_num)
            })
            .collect();

        slides.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });

        Ok(slides.into_iter().map(|(path, _)| path).collect())
    }

    /// Collect the accepted pictures of one slide.
    fn extract_slide<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        slide_path: &str,
        slide_index: usize,
        slide_size: SlideSize,
        deck_path: &Path,
    ) -> Result<Vec<ExtractedImage>> {
        let content = self.read_file_from_archive(archive, slide_path)?;
        let pictures = extract_pictures_from_xml(&content)?;

        let candidates: Vec<PictureInfo> = pictures
            .into_iter()
            .filter(|pic| {
                let accepted = self.policy.accepts(pic.width, pic.height, slide_size);
                if !accepted {
                    log::debug!(
                        "{} slide {} shape {}: {}x{} too small for canvas",
                        deck_path.display(),
                        slide_index + 1,
                        pic.shape_index + 1,
                        pic.width,
                        pic.height
                    );
                }
                accepted
            })
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let rels_content = self.read_file_from_archive(archive, &slide_rels_path(slide_path))?;
        let targets: HashMap<String, String> = parse_relationships(&rels_content)?
            .into_iter()
            .map(|rel| (rel.id, rel.target))
            .collect();
        let slide_dir = slide_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

        let mut images = Vec::new();
        for pic in candidates {
            let media_path = match pic.embed.as_ref().and_then(|id| targets.get(id)) {
                Some(target) => resolve_target(slide_dir, target),
                None => {
                    log::error!(
                        "{} slide {} shape {}: picture has no embedded image relationship",
                        deck_path.display(),
                        slide_index + 1,
                        pic.shape_index + 1
                    );
                    continue;
                }
            };

            match self.read_bytes_from_archive(archive, &media_path) {
                Ok(bytes) => images.push(ExtractedImage {
                    bytes,
                    slide_index,
                    shape_index: pic.shape_index,
                    deck_path: deck_path.to_path_buf(),
                }),
                Err(e) => log::error!(
                    "{} slide {} shape {}: {}",
                    deck_path.display(),
                    slide_index + 1,
                    pic.shape_index + 1,
                    e
                ),
            }
        }

        Ok(images)
    }

    /// Read a text part from the ZIP archive.
    fn read_file_from_archive<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        path: &str,
    ) -> Result<String> {
        let mut file = archive
            .by_name(path)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

        Ok(content)
    }

    /// Read a binary part (media) from the ZIP archive.
    fn read_bytes_from_archive<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        path: &str,
    ) -> Result<Vec<u8>> {
        let mut file = archive
            .by_name(path)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

        Ok(content)
    }
}

/// A package relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

impl Relationship {
    fn is_slide(&self) -> bool {
        self.rel_type.ends_with("/slide")
    }
}

/// A top-level picture shape as read from slide XML.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct PictureInfo {
    shape_index: usize,
    width: i64,
    height: i64,
    embed: Option<String>,
    placeholder: bool,
}

/// Read the slide canvas and the ordered slide relationship ids.
fn parse_presentation(xml_content: &str) -> Result<(SlideSize, Vec<String>)> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut slide_size = None;
    let mut slide_ids = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match local_name(e.name().as_ref()) {
                b"sldSz" => {
                    let cx = int_attribute(e, b"cx");
                    let cy = int_attribute(e, b"cy");
                    if let (Some(cx), Some(cy)) = (cx, cy) {
                        slide_size = Some(SlideSize::new(cx, cy));
                    }
                }
                b"sldId" => {
                    for attr in e.attributes().flatten() {
                        if is_relationship_id(attr.key.as_ref()) {
                            slide_ids.push(String::from_utf8_lossy(&attr.value).to_string());
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!("Error parsing presentation: {}", e)));
            }
            _ => {}
        }
    }

    let slide_size = slide_size.unwrap_or_else(|| {
        log::warn!("Presentation has no slide size, assuming 4:3 default");
        SlideSize::default()
    });

    Ok((slide_size, slide_ids))
}

/// Parse a `.rels` part.
fn parse_relationships(xml_content: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);
    let mut relationships = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"Relationship" => {
                let mut rel_type = String::new();
                let mut target = String::new();
                let mut id = String::new();

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Type" => {
                            rel_type = String::from_utf8_lossy(&attr.value).to_string();
                        }
                        b"Target" => {
                            target = String::from_utf8_lossy(&attr.value).to_string();
                        }
                        b"Id" => {
                            id = String::from_utf8_lossy(&attr.value).to_string();
                        }
                        _ => {}
                    }
                }

                relationships.push(Relationship { id, rel_type, target });
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!("Error parsing relationships: {}", e)));
            }
            _ => {}
        }
    }

    Ok(relationships)
}

/// Number the top-level shapes of a slide and collect its non-placeholder pictures.
fn extract_pictures_from_xml(xml_content: &str) -> Result<Vec<PictureInfo>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut pictures = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut sp_tree_depth: Option<usize> = None;
    let mut shape_count = 0usize;
    let mut current: Option<PictureInfo> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e.name().as_ref()).to_vec();
                open_element(e, &name, &stack, &mut sp_tree_depth, &mut shape_count, &mut current);
                stack.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                let name = local_name(e.name().as_ref()).to_vec();
                open_element(e, &name, &stack, &mut sp_tree_depth, &mut shape_count, &mut current);
                // A self-closing top-level <p:pic/> has nothing to extract
                if name == b"pic" && sp_tree_depth.map(|d| stack.len() == d + 1).unwrap_or(false) {
                    current = None;
                }
            }
            Ok(Event::End(_)) => {
                let name = stack.pop().unwrap_or_default();
                let at_shape_level = sp_tree_depth.map(|d| stack.len() == d + 1).unwrap_or(false);

                if name == b"pic" && at_shape_level {
                    if let Some(pic) = current.take() {
                        if !pic.placeholder {
                            pictures.push(pic);
                        }
                    }
                } else if name == b"spTree" && sp_tree_depth == Some(stack.len()) {
                    sp_tree_depth = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!("Error parsing slide: {}", e)));
            }
            _ => {}
        }
    }

    Ok(pictures)
}

/// Track an opening tag while walking slide XML.
fn open_element(
    e: &BytesStart<'_>,
    name: &[u8],
    stack: &[Vec<u8>],
    sp_tree_depth: &mut Option<usize>,
    shape_count: &mut usize,
    current: &mut Option<PictureInfo>,
) {
    let depth = stack.len();

    if name == b"spTree" && sp_tree_depth.is_none() {
        *sp_tree_depth = Some(depth);
        return;
    }

    if let Some(tree_depth) = *sp_tree_depth {
        if depth == tree_depth + 1 && SHAPE_ELEMENTS.contains(&name) {
            let shape_index = *shape_count;
            *shape_count += 1;
            if name == b"pic" {
                *current = Some(PictureInfo {
                    shape_index,
                    ..PictureInfo::default()
                });
            }
            return;
        }
    }

    let Some(pic) = current.as_mut() else {
        return;
    };

    match name {
        b"ph" => pic.placeholder = true,
        b"blip" => {
            for attr in e.attributes().flatten() {
                if local_name(attr.key.as_ref()) == b"embed" {
                    pic.embed = Some(String::from_utf8_lossy(&attr.value).to_string());
                }
            }
        }
        b"ext" if parent_is(stack, b"xfrm", b"spPr") => {
            pic.width = int_attribute(e, b"cx").unwrap_or(0);
            pic.height = int_attribute(e, b"cy").unwrap_or(0);
        }
        _ => {}
    }
}

/// Whether the innermost open elements are `grandparent > parent`.
fn parent_is(stack: &[Vec<u8>], parent: &[u8], grandparent: &[u8]) -> bool {
    let n = stack.len();
    n >= 2 && stack[n - 1] == parent && stack[n - 2] == grandparent
}

fn int_attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<i64> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| String::from_utf8_lossy(&attr.value).parse::<i64>().ok())
}

/// `r:id` style attribute: prefixed, local name `id`.
fn is_relationship_id(key: &[u8]) -> bool {
    key.contains(&b':') && local_name(key) == b"id"
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Extract a slide number from a string like "rId2" or "slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    // Remove common extensions first
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");

    // Try to find digits at the end
    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}

/// "ppt/slides/slide1.xml" -> "ppt/slides/_rels/slide1.xml.rels"
fn slide_rels_path(slide_path: &str) -> String {
    match slide_path.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", slide_path),
    }
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::path::PathBuf;
    use zip::write::FileOptions;

    const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
    const SLIDE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
    const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

    fn pic(id: &str, embed: &str, cx: i64, cy: i64, placeholder: bool) -> String {
        let ph = if placeholder { r#"<p:ph type="pic" idx="1"/>"# } else { "" };
        format!(
            r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Picture {id}"/><p:cNvPicPr/><p:nvPr>{ph}</p:nvPr></p:nvPicPr><p:blipFill><a:blip r:embed="{embed}"><a:extLst><a:ext uri="{{28A0092B}}"/></a:extLst></a:blip><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#
        )
    }

    fn text_shape() -> String {
        r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="10" y="10"/><a:ext cx="99999999" cy="99999999"/></a:xfrm></p:spPr><p:txBody><a:bodyPr/><a:p><a:r><a:t>Title</a:t></a:r></a:p></p:txBody></p:sp>"#.to_string()
    }

    fn slide_xml(shapes: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld {NS}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:spTree></p:cSld></p:sld>"#,
            shapes.concat()
        )
    }

    fn rels_xml(rels: &[(&str, &str, &str)]) -> String {
        let body: String = rels
            .iter()
            .map(|(id, ty, target)| format!(r#"<Relationship Id="{id}" Type="{ty}" Target="{target}"/>"#))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{body}</Relationships>"#
        )
    }

    fn build_pptx(parts: &[(&str, Vec<u8>)]) -> Cursor<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in parts {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    fn presentation_xml(slide_rids: &[&str], cx: i64, cy: i64) -> Vec<u8> {
        let ids: String = slide_rids
            .iter()
            .enumerate()
            .map(|(i, rid)| format!(r#"<p:sldId id="{}" r:id="{rid}"/>"#, 256 + i))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:presentation {NS}><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx="{cx}" cy="{cy}"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#
        )
        .into_bytes()
    }

    /// Two slides listed in reverse file order; slide A holds four shapes.
    fn sample_deck() -> Cursor<Vec<u8>> {
        let slide_a = slide_xml(&[
            text_shape(),
            pic("3", "rId2", 1920, 1080, false),
            pic("4", "rId3", 300, 200, false),
            pic("5", "rId2", 1920, 1080, true),
        ]);
        let slide_b = slide_xml(&[pic("2", "rId7", 5000, 4000, false)]);

        build_pptx(&[
            ("ppt/presentation.xml", presentation_xml(&["rId3", "rId2"], 1920, 1080)),
            (
                "ppt/_rels/presentation.xml.rels",
                rels_xml(&[
                    ("rId1", "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster", "slideMasters/slideMaster1.xml"),
                    ("rId2", SLIDE_REL, "slides/slide1.xml"),
                    ("rId3", SLIDE_REL, "slides/slide2.xml"),
                ])
                .into_bytes(),
            ),
            ("ppt/slides/slide2.xml", slide_a.into_bytes()),
            (
                "ppt/slides/_rels/slide2.xml.rels",
                rels_xml(&[
                    ("rId1", "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout", "../slideLayouts/slideLayout1.xml"),
                    ("rId2", IMAGE_REL, "../media/image1.png"),
                    ("rId3", IMAGE_REL, "../media/image2.png"),
                ])
                .into_bytes(),
            ),
            ("ppt/slides/slide1.xml", slide_b.into_bytes()),
            (
                "ppt/slides/_rels/slide1.xml.rels",
                rels_xml(&[("rId7", IMAGE_REL, "/ppt/media/image3.jpeg")]).into_bytes(),
            ),
            ("ppt/media/image1.png", b"first".to_vec()),
            ("ppt/media/image2.png", b"small".to_vec()),
            ("ppt/media/image3.jpeg", b"third".to_vec()),
        ])
    }

    #[test]
    fn test_extract_follows_slide_id_order_and_size_policy() {
        let deck = PathBuf::from("/decks/sample.pptx");
        let images = PptxExtractor::new().extract(sample_deck(), &deck).unwrap();

        assert_eq!(images.len(), 2);

        // slide2.xml is listed first, its full-bleed picture is shape #2
        assert_eq!(images[0].slide_index, 0);
        assert_eq!(images[0].shape_index, 1);
        assert_eq!(images[0].bytes, b"first");
        assert_eq!(images[0].deck_path, deck);

        // slide1.xml comes second, absolute media target
        assert_eq!(images[1].slide_index, 1);
        assert_eq!(images[1].shape_index, 0);
        assert_eq!(images[1].bytes, b"third");
    }

    #[test]
    fn test_extract_with_wider_tolerance_accepts_small_pictures() {
        let extractor = PptxExtractor::new().with_policy(SizePolicy::new().with_tolerance(2000));
        let images = extractor
            .extract(sample_deck(), Path::new("sample.pptx"))
            .unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[1].bytes, b"small");
        assert_eq!(images[1].shape_index, 2);
    }

    #[test]
    fn test_missing_media_is_skipped() {
        let slide = slide_xml(&[
            pic("2", "rId2", 1920, 1080, false),
            pic("3", "rId3", 1920, 1080, false),
        ]);
        let deck = build_pptx(&[
            ("ppt/presentation.xml", presentation_xml(&["rId2"], 1920, 1080)),
            (
                "ppt/_rels/presentation.xml.rels",
                rels_xml(&[("rId2", SLIDE_REL, "slides/slide1.xml")]).into_bytes(),
            ),
            ("ppt/slides/slide1.xml", slide.into_bytes()),
            (
                "ppt/slides/_rels/slide1.xml.rels",
                rels_xml(&[
                    ("rId2", IMAGE_REL, "../media/missing.png"),
                    ("rId3", IMAGE_REL, "../media/present.png"),
                ])
                .into_bytes(),
            ),
            ("ppt/media/present.png", b"ok".to_vec()),
        ]);

        let images = PptxExtractor::new().extract(deck, Path::new("d.pptx")).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].shape_index, 1);
        assert_eq!(images[0].bytes, b"ok");
    }

    #[test]
    fn test_not_a_zip_is_deck_error() {
        let result = PptxExtractor::new().extract(Cursor::new(b"plain text".to_vec()), Path::new("x.pptx"));
        assert!(matches!(result, Err(Error::ZipError(_))));
    }

    #[test]
    fn test_zip_without_presentation_is_deck_error() {
        let package = build_pptx(&[("word/document.xml", b"<w:document/>".to_vec())]);
        let result = PptxExtractor::new().extract(package, Path::new("x.pptx"));
        assert!(matches!(result, Err(Error::PptxParseError(_))));
    }

    #[test]
    fn test_slide_order_fallback_without_id_list() {
        let extractor = PptxExtractor::new();
        let mut archive = ZipArchive::new(build_pptx(&[(
            "ppt/_rels/presentation.xml.rels",
            rels_xml(&[
                ("rId10", SLIDE_REL, "slides/slide10.xml"),
                ("rId2", SLIDE_REL, "slides/slide2.xml"),
            ])
            .into_bytes(),
        )]))
        .unwrap();

        let order = extractor.get_slide_order(&mut archive, &[]).unwrap();
        assert_eq!(order, vec!["ppt/slides/slide2.xml", "ppt/slides/slide10.xml"]);
    }

    #[test]
    fn test_pictures_inside_groups_are_not_top_level() {
        let group = format!(
            r#"<p:grpSp><p:nvGrpSpPr><p:cNvPr id="9" name="Group"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:grpSp>"#,
            pic("10", "rId2", 1920, 1080, false)
        );
        let xml = slide_xml(&[group, pic("11", "rId3", 1920, 1080, false)]);
        let pictures = extract_pictures_from_xml(&xml).unwrap();

        assert_eq!(
            pictures,
            vec![PictureInfo {
                shape_index: 1,
                width: 1920,
                height: 1080,
                embed: Some("rId3".to_string()),
                placeholder: false,
            }]
        );
    }

    #[test]
    fn test_parse_presentation() {
        let xml = String::from_utf8(presentation_xml(&["rId5", "rId6"], 12192000, 6858000)).unwrap();
        let (size, ids) = parse_presentation(&xml).unwrap();
        assert_eq!(size, SlideSize::new(12192000, 6858000));
        assert_eq!(ids, vec!["rId5", "rId6"]);
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("ppt/slides", "../media/image1.png"), "ppt/media/image1.png");
        assert_eq!(resolve_target("ppt", "slides/slide1.xml"), "ppt/slides/slide1.xml");
        assert_eq!(resolve_target("ppt/slides", "/ppt/media/a.emf"), "ppt/media/a.emf");
        assert_eq!(resolve_target("ppt/slides", "./img.png"), "ppt/slides/img.png");
    }

    #[test]
    fn test_slide_rels_path() {
        assert_eq!(slide_rels_path("ppt/slides/slide1.xml"), "ppt/slides/_rels/slide1.xml.rels");
    }

    #[test]
    fn test_extract_slide_number() {
        assert_eq!(extract_slide_number("rId1"), Some(1));
        assert_eq!(extract_slide_number("rId12"), Some(12));
        assert_eq!(extract_slide_number("slide1.xml"), Some(1));
        assert_eq!(extract_slide_number("slide123.xml"), Some(123));
        assert_eq!(extract_slide_number("nodigits"), None);
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"p:pic"), b"pic");
        assert_eq!(local_name(b"a:blip"), b"blip");
        assert_eq!(local_name(b"pic"), b"pic");
    }

    #[test]
    fn test_is_relationship_id() {
        assert!(is_relationship_id(b"r:id"));
        assert!(!is_relationship_id(b"id"));
        assert!(!is_relationship_id(b"r:embed"));
    }
}
