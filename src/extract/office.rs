//! Office document extractors (.docx, .xlsx, .pptx).
//!
//! OOXML containers are ZIP archives of XML parts; the text lives in `w:t`
//! (Word), shared strings + `v` cells (Excel), and `a:t` (PowerPoint)
//! elements, pulled out with a streaming `quick-xml` reader. Corrupt and
//! password-protected files degrade to soft-failure documents.

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{
    base_document, check_file_size, file_stem, is_password_error, soft_failure_metadata,
    Extractor, SourceInfo,
};
use crate::models::Document;

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

// ── Shared OOXML plumbing ──────────────────────────────────────────────

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|_| anyhow!("file corrupted or invalid format"))
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive.by_name(name)?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        anyhow::bail!("ZIP entry {} exceeds size limit", name);
    }
    Ok(out)
}

/// Collect the text of every `text_element`, inserting a line break at
/// each closing `block_element` (paragraph, row, slide shape).
fn collect_text_elements(xml: &[u8], text_element: &[u8], block_element: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == text_element {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_text => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == text_element {
                    in_text = false;
                } else if name.as_ref() == block_element
                    && !out.is_empty()
                    && !out.ends_with('\n')
                {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(anyhow!("malformed XML: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// Core properties from `docProps/core.xml`: title, author, subject,
/// keywords. Absent part or fields are fine.
fn read_core_properties(archive: &mut Archive<'_>) -> Map<String, Value> {
    let mut props = Map::new();
    let Ok(xml) = read_zip_entry_bounded(archive, "docProps/core.xml") else {
        return props;
    };

    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<&'static str> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                current = match e.local_name().as_ref() {
                    b"title" => Some("title"),
                    b"creator" => Some("author"),
                    b"subject" => Some("subject"),
                    b"keywords" => Some("keywords"),
                    _ => None,
                };
            }
            Ok(quick_xml::events::Event::Text(t)) => {
                if let Some(field) = current {
                    let value = t.unescape().unwrap_or_default().trim().to_string();
                    if !value.is_empty() {
                        props.insert(field.to_string(), Value::String(value));
                    }
                }
            }
            Ok(quick_xml::events::Event::End(_)) => current = None,
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    props
}

/// Numbered parts like `ppt/slides/slide7.xml`, sorted numerically so
/// slide 10 comes after slide 9, not after slide 1.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Shared soft-failure wrapper: run the format-specific parse, degrade any
/// error into (empty content, flagged metadata) with the password heuristic
/// applied to the message.
fn parse_or_degrade(
    bytes: &[u8],
    keywords: &[String],
    parse: impl FnOnce(&[u8]) -> Result<(String, Map<String, Value>)>,
) -> (String, Map<String, Value>) {
    match parse(bytes) {
        Ok(ok) => ok,
        Err(e) => {
            let message = if is_password_error(&e.to_string(), keywords) {
                "file is password-protected".to_string()
            } else {
                e.to_string()
            };
            (String::new(), soft_failure_metadata(&message))
        }
    }
}

fn finish_document(
    path: &Path,
    source: &SourceInfo,
    doc_type: &str,
    content: String,
    metadata: Map<String, Value>,
) -> Result<Document> {
    let title = metadata
        .get("title")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| file_stem(path));

    let mut doc = base_document(path, source, doc_type, content)?;
    doc.title = Some(title);
    doc.metadata = metadata;
    Ok(doc)
}

// ── Word ───────────────────────────────────────────────────────────────

pub struct DocxExtractor {
    max_size: u64,
    timeout: Duration,
    password_keywords: Arc<Vec<String>>,
}

impl DocxExtractor {
    pub fn new(max_size: u64, timeout: Duration, password_keywords: Arc<Vec<String>>) -> Self {
        Self {
            max_size,
            timeout,
            password_keywords,
        }
    }
}

impl Extractor for DocxExtractor {
    fn name(&self) -> &str {
        "docx"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".docx"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_size
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn extract(&self, path: &Path, source: &SourceInfo) -> Result<Document> {
        check_file_size(path, self.max_size)?;
        let bytes = std::fs::read(path)?;
        let (content, metadata) = parse_or_degrade(&bytes, &self.password_keywords, parse_docx);
        finish_document(path, source, self.name(), content, metadata)
    }
}

fn parse_docx(bytes: &[u8]) -> Result<(String, Map<String, Value>)> {
    let mut archive = open_archive(bytes)?;
    let mut metadata = read_core_properties(&mut archive);

    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")
        .map_err(|_| anyhow!("word/document.xml not found"))?;
    // Paragraph and table-cell text both live in w:t runs; closing w:p
    // elements become line breaks.
    let text = collect_text_elements(&xml, b"t", b"p")?;

    let closing_p: &[u8] = b"</w:p>";
    let paragraph_count = xml.windows(closing_p.len()).filter(|w| *w == closing_p).count();
    metadata.insert(
        "paragraph_count".to_string(),
        Value::from(paragraph_count as u64),
    );
    insert_extraction_stats(&mut metadata, &text, "document may be empty or image-based");
    Ok((text, metadata))
}

// ── Excel ──────────────────────────────────────────────────────────────

pub struct XlsxExtractor {
    max_size: u64,
    timeout: Duration,
    password_keywords: Arc<Vec<String>>,
}

impl XlsxExtractor {
    pub fn new(max_size: u64, timeout: Duration, password_keywords: Arc<Vec<String>>) -> Self {
        Self {
            max_size,
            timeout,
            password_keywords,
        }
    }
}

impl Extractor for XlsxExtractor {
    fn name(&self) -> &str {
        "xlsx"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".xlsx"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_size
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn extract(&self, path: &Path, source: &SourceInfo) -> Result<Document> {
        check_file_size(path, self.max_size)?;
        let bytes = std::fs::read(path)?;
        let (content, metadata) = parse_or_degrade(&bytes, &self.password_keywords, parse_xlsx);
        finish_document(path, source, self.name(), content, metadata)
    }
}

fn parse_xlsx(bytes: &[u8]) -> Result<(String, Map<String, Value>)> {
    let mut archive = open_archive(bytes)?;
    let mut metadata = read_core_properties(&mut archive);

    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = numbered_parts(&archive, "xl/worksheets/sheet");
    metadata.insert(
        "sheet_count".to_string(),
        Value::from(sheet_names.len() as u64),
    );

    let mut out = String::new();
    let mut total_cells = 0u64;
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let (cells, count) = extract_sheet_cells(&xml, &shared_strings)?;
        total_cells += count;
        if !out.is_empty() && !cells.is_empty() {
            out.push('\n');
        }
        out.push_str(&cells);
    }

    metadata.insert("cells_extracted".to_string(), Value::from(total_cells));
    insert_extraction_stats(&mut metadata, &out, "spreadsheet may be empty");
    Ok((out, metadata))
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>> {
    // A workbook with no string cells has no sharedStrings part.
    let Ok(xml) = read_zip_entry_bounded(archive, "xl/sharedStrings.xml") else {
        return Ok(Vec::new());
    };

    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(t)) if in_t => {
                current.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(anyhow!("malformed XML: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values from one worksheet: shared strings resolved through the
/// string table, other value types taken as their raw text.
fn extract_sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<(String, u64)> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared = false;
    loop {
        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"c" {
                    cell_is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                } else if e.local_name().as_ref() == b"v" {
                    in_v = true;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_v => {
                let value = t.unescape().unwrap_or_default();
                let value = value.trim();
                if !value.is_empty() {
                    if cell_is_shared {
                        if let Some(s) = value
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i))
                        {
                            if !s.is_empty() {
                                cells.push(s.clone());
                            }
                        }
                    } else {
                        cells.push(value.to_string());
                    }
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"v" {
                    in_v = false;
                } else if e.local_name().as_ref() == b"c" {
                    cell_is_shared = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(anyhow!("malformed XML: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    let count = cells.len() as u64;
    Ok((cells.join(" "), count))
}

// ── PowerPoint ─────────────────────────────────────────────────────────

pub struct PptxExtractor {
    max_size: u64,
    timeout: Duration,
    password_keywords: Arc<Vec<String>>,
}

impl PptxExtractor {
    pub fn new(max_size: u64, timeout: Duration, password_keywords: Arc<Vec<String>>) -> Self {
        Self {
            max_size,
            timeout,
            password_keywords,
        }
    }
}

impl Extractor for PptxExtractor {
    fn name(&self) -> &str {
        "pptx"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".pptx"]
    }

    fn max_file_size(&self) -> u64 {
        self.max_size
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn extract(&self, path: &Path, source: &SourceInfo) -> Result<Document> {
        check_file_size(path, self.max_size)?;
        let bytes = std::fs::read(path)?;
        let (content, metadata) = parse_or_degrade(&bytes, &self.password_keywords, parse_pptx);
        finish_document(path, source, self.name(), content, metadata)
    }
}

fn parse_pptx(bytes: &[u8]) -> Result<(String, Map<String, Value>)> {
    let mut archive = open_archive(bytes)?;
    let mut metadata = read_core_properties(&mut archive);

    let slide_names = numbered_parts(&archive, "ppt/slides/slide");
    let note_names = numbered_parts(&archive, "ppt/notesSlides/notesSlide");
    metadata.insert(
        "slide_count".to_string(),
        Value::from(slide_names.len() as u64),
    );

    let mut out = String::new();
    for name in slide_names.into_iter().chain(note_names) {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = collect_text_elements(&xml, b"t", b"p")?;
        if !out.is_empty() && !text.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }

    insert_extraction_stats(&mut metadata, &out, "presentation may be empty or image-based");
    Ok((out, metadata))
}

fn insert_extraction_stats(metadata: &mut Map<String, Value>, text: &str, empty_hint: &str) {
    metadata.insert(
        "extracted_text_length".to_string(),
        Value::from(text.len() as u64),
    );
    metadata.insert("extraction_failed".to_string(), Value::Bool(false));
    if text.trim().is_empty() {
        metadata.insert(
            "extraction_warning".to_string(),
            Value::String(format!("no text extracted ({})", empty_hint)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn source() -> SourceInfo {
        SourceInfo {
            source_id: "docs".to_string(),
            source_name: "Docs".to_string(),
        }
    }

    fn keywords() -> Arc<Vec<String>> {
        Arc::new(vec![
            "password".to_string(),
            "encrypted".to_string(),
            "protected".to_string(),
        ])
    }

    /// Build a minimal OOXML-shaped zip in memory.
    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        use std::io::Write;
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn docx_text_and_core_properties() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("report.docx");
        let zip = build_zip(&[
            (
                "docProps/core.xml",
                r#"<cp:coreProperties xmlns:cp="c" xmlns:dc="d"><dc:title>Quarterly Report</dc:title><dc:creator>Ada</dc:creator></cp:coreProperties>"#,
            ),
            (
                "word/document.xml",
                r#"<w:document xmlns:w="w"><w:body><w:p><w:r><w:t>Hello</w:t></w:r></w:p><w:p><w:r><w:t>World</w:t></w:r></w:p></w:body></w:document>"#,
            ),
        ]);
        fs::write(&path, zip).unwrap();

        let extractor =
            DocxExtractor::new(50 * 1024 * 1024, Duration::from_secs(30), keywords());
        let doc = extractor.extract(&path, &source()).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Quarterly Report"));
        assert_eq!(doc.content, "Hello\nWorld");
        assert_eq!(doc.metadata["author"], "Ada");
        assert_eq!(doc.metadata["extraction_failed"], false);
    }

    #[test]
    fn xlsx_resolves_shared_strings_and_numbers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.xlsx");
        let zip = build_zip(&[
            (
                "xl/sharedStrings.xml",
                r#"<sst><si><t>alpha</t></si><si><t>beta</t></si></sst>"#,
            ),
            (
                "xl/worksheets/sheet1.xml",
                r#"<worksheet><sheetData><row><c t="s"><v>0</v></c><c><v>42</v></c><c t="s"><v>1</v></c></row></sheetData></worksheet>"#,
            ),
        ]);
        fs::write(&path, zip).unwrap();

        let extractor =
            XlsxExtractor::new(50 * 1024 * 1024, Duration::from_secs(30), keywords());
        let doc = extractor.extract(&path, &source()).unwrap();
        assert_eq!(doc.content, "alpha 42 beta");
        assert_eq!(doc.metadata["cells_extracted"], 3);
        assert_eq!(doc.metadata["sheet_count"], 1);
    }

    #[test]
    fn pptx_orders_slides_numerically() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deck.pptx");
        let zip = build_zip(&[
            (
                "ppt/slides/slide10.xml",
                r#"<p:sld xmlns:a="a"><a:t>ten</a:t></p:sld>"#,
            ),
            (
                "ppt/slides/slide2.xml",
                r#"<p:sld xmlns:a="a"><a:t>two</a:t></p:sld>"#,
            ),
        ]);
        fs::write(&path, zip).unwrap();

        let extractor =
            PptxExtractor::new(50 * 1024 * 1024, Duration::from_secs(30), keywords());
        let doc = extractor.extract(&path, &source()).unwrap();
        let two = doc.content.find("two").unwrap();
        let ten = doc.content.find("ten").unwrap();
        assert!(two < ten);
        assert_eq!(doc.metadata["slide_count"], 2);
    }

    #[test]
    fn invalid_zip_degrades_to_soft_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.docx");
        fs::write(&path, "not a zip archive").unwrap();

        let extractor =
            DocxExtractor::new(50 * 1024 * 1024, Duration::from_secs(30), keywords());
        let doc = extractor.extract(&path, &source()).unwrap();
        assert_eq!(doc.content, "");
        assert_eq!(doc.title.as_deref(), Some("broken"));
        assert_eq!(doc.metadata["extraction_failed"], true);
        assert_eq!(doc.metadata["extraction_error"], "file corrupted or invalid format");
    }

    #[test]
    fn password_keyword_in_error_is_reported_as_protection() {
        let (content, metadata) = parse_or_degrade(
            b"irrelevant",
            &["encrypted".to_string()],
            |_| anyhow::bail!("stream is ENCRYPTED with unknown cipher"),
        );
        assert_eq!(content, "");
        assert_eq!(metadata["extraction_error"], "file is password-protected");
    }
}
