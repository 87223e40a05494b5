//! Document Parser Module
//!
//! Pure Rust text extraction from documents - no external dependencies required.
//!
//! ## Supported Formats
//! - PDF: Text extraction via pdf-extract
//! - Excel: .xlsx, .xls via calamine
//! - Word: .docx via docx-rs
//! - PowerPoint: .pptx slide text via zip + regex
//! - ZIP: every supported member, one section per member
//! - Text: .txt, .md, .csv, .json, .xml, .yaml, .log (direct read)
//! - HTML: tags stripped with regex
//! - Images: no OCR, extracted as empty text

use calamine::{Data, Range, Reader, Xls, Xlsx};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::Path;

use super::{Extraction, ExtractionError, Extractor};

/// Maximum text length to extract, in characters
const MAX_TEXT_LENGTH: usize = 500_000;

/// Archive members larger than this are skipped
const MAX_MEMBER_BYTES: u64 = 32 * 1024 * 1024;

static SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static SLIDE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("valid regex"));
static DRAWING_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<a:p[ >].*?</a:p>").expect("valid regex"));
static DRAWING_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<a:t(?:\s[^>]*)?>(.*?)</a:t>").expect("valid regex"));

/// Document parser using pure Rust crates
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentParser;

impl DocumentParser {
    pub fn new() -> Self {
        Self
    }

    /// Check if extension is plain text
    fn is_plain_text_ext(ext: &str) -> bool {
        matches!(
            ext,
            "txt" | "md" | "csv" | "json" | "xml" | "yaml" | "yml" | "log" | "ini" | "toml"
        )
    }

    fn is_image_ext(ext: &str) -> bool {
        matches!(ext, "png" | "jpg" | "jpeg" | "gif" | "webp" | "tiff" | "bmp")
    }

    /// Check if a file type is supported for text extraction
    pub fn is_supported(ext: Option<&str>) -> bool {
        match ext.map(str::to_lowercase) {
            Some(e) => {
                Self::is_plain_text_ext(&e)
                    || Self::is_image_ext(&e)
                    || matches!(
                        e.as_str(),
                        "pdf" | "docx" | "pptx" | "xlsx" | "xls" | "html" | "htm" | "zip"
                    )
            }
            None => false,
        }
    }

    fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractionError> {
        std::fs::read(path).map_err(|e| ExtractionError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Dispatch on a lowercase extension. `nested` is false only for the
    /// top-level file, so archives inside archives are skipped.
    fn extract_bytes(&self, ext: &str, bytes: &[u8], nested: bool) -> Result<String, ExtractionError> {
        match ext {
            e if Self::is_plain_text_ext(e) => Ok(String::from_utf8_lossy(bytes).into_owned()),
            e if Self::is_image_ext(e) => Ok(String::new()),
            "html" | "htm" => Ok(Self::strip_html(&String::from_utf8_lossy(bytes))),
            "pdf" => self.extract_pdf(bytes),
            "xlsx" => self.extract_xlsx(bytes),
            "xls" => self.extract_xls(bytes),
            "docx" => self.extract_docx(bytes),
            "pptx" => self.extract_pptx(bytes),
            "zip" if !nested => self.extract_zip(bytes),
            other => Err(ExtractionError::Unsupported(format!(".{}", other))),
        }
    }

    fn decode_entities(text: &str) -> String {
        text.replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }

    fn strip_html(raw: &str) -> String {
        let without_scripts = SCRIPT_STYLE.replace_all(raw, " ");
        let text = TAG.replace_all(&without_scripts, "\n");
        Self::decode_entities(&text)
    }

    /// Extract text from PDF using pdf-extract
    /// Wrapped in catch_unwind to handle panics from malformed PDFs
    fn extract_pdf(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        tracing::debug!(size = bytes.len(), "Starting PDF extraction");

        // The pdf_extract crate (and its cff-parser dependency) can panic on certain fonts/glyphs
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(bytes)
        })) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(ExtractionError::Parse {
                format: "pdf",
                message: e.to_string(),
            }),
            Err(_panic) => {
                tracing::error!("PDF extraction panicked - likely malformed font/glyph");
                Err(ExtractionError::Parse {
                    format: "pdf",
                    message: "extraction panicked - likely contains malformed fonts".to_string(),
                })
            }
        }
    }

    fn sheet_to_text(name: &str, range: &Range<Data>, out: &mut String) {
        out.push_str(&format!("\n## Sheet: {}\n", name));
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| cell.to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !cells.is_empty() {
                out.push_str(&cells.join(" | "));
                out.push('\n');
            }
        }
    }

    fn workbook_to_text<RS, R>(workbook: &mut R) -> String
    where
        RS: std::io::Read + std::io::Seek,
        R: Reader<RS>,
    {
        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        let mut all_text = String::new();
        for sheet_name in &sheet_names {
            if let Ok(range) = workbook.worksheet_range(sheet_name) {
                Self::sheet_to_text(sheet_name, &range, &mut all_text);
            }
        }
        all_text
    }

    /// Extract text from XLSX using calamine
    fn extract_xlsx(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut workbook: Xlsx<Cursor<&[u8]>> =
            Xlsx::new(Cursor::new(bytes)).map_err(|e: calamine::XlsxError| ExtractionError::Parse {
                format: "xlsx",
                message: format!("{}", e),
            })?;
        Ok(Self::workbook_to_text(&mut workbook))
    }

    /// Extract text from XLS (older Excel format) using calamine
    fn extract_xls(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut workbook: Xls<Cursor<&[u8]>> =
            Xls::new(Cursor::new(bytes)).map_err(|e: calamine::XlsError| ExtractionError::Parse {
                format: "xls",
                message: format!("{}", e),
            })?;
        Ok(Self::workbook_to_text(&mut workbook))
    }

    fn open_archive<'a>(
        bytes: &'a [u8],
        format: &'static str,
    ) -> Result<zip::ZipArchive<Cursor<&'a [u8]>>, ExtractionError> {
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractionError::Parse {
            format,
            message: e.to_string(),
        })
    }

    /// Extract slide text from PPTX: one `## Slide n` section per slide,
    /// one line per drawing paragraph
    fn extract_pptx(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = Self::open_archive(bytes, "pptx")?;

        let mut slides: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|name| {
                let number = SLIDE_NAME.captures(name)?.get(1)?.as_str().parse().ok()?;
                Some((number, name.to_string()))
            })
            .collect();
        slides.sort();

        let mut all_text = String::new();
        for (number, name) in slides {
            let mut xml = String::new();
            archive
                .by_name(&name)
                .map_err(|e| e.to_string())
                .and_then(|mut entry| entry.read_to_string(&mut xml).map_err(|e| e.to_string()))
                .map_err(|message| ExtractionError::Parse {
                    format: "pptx",
                    message,
                })?;

            all_text.push_str(&format!("\n## Slide {}\n", number));
            for paragraph in DRAWING_PARAGRAPH.find_iter(&xml) {
                let line: String = DRAWING_TEXT
                    .captures_iter(paragraph.as_str())
                    .filter_map(|c| c.get(1))
                    .map(|m| Self::decode_entities(m.as_str()))
                    .collect();
                if !line.trim().is_empty() {
                    all_text.push_str(&line);
                    all_text.push('\n');
                }
            }
        }
        Ok(all_text)
    }

    /// Extract every supported member of a ZIP archive; unreadable or
    /// unsupported members are skipped
    fn extract_zip(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = Self::open_archive(bytes, "zip")?;

        let mut all_text = String::new();
        for index in 0..archive.len() {
            let Ok(mut entry) = archive.by_index(index) else {
                continue;
            };
            let name = entry.name().to_string();
            let ext = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase);
            let Some(ext) = ext.filter(|e| e.as_str() != "zip" && Self::is_supported(Some(e.as_str())))
            else {
                continue;
            };
            if entry.is_dir() || entry.size() > MAX_MEMBER_BYTES {
                tracing::debug!(member = %name, "Skipping archive member");
                continue;
            }

            let mut member = Vec::new();
            if let Err(e) = entry.read_to_end(&mut member) {
                tracing::warn!(member = %name, "Failed to read archive member: {}", e);
                continue;
            }
            drop(entry);

            match self.extract_bytes(&ext, &member, true) {
                Ok(text) => {
                    all_text.push_str(&format!("\n## {}\n", name));
                    all_text.push_str(&text);
                    all_text.push('\n');
                }
                Err(e) => tracing::warn!(member = %name, "Skipping archive member: {}", e),
            }
        }
        Ok(all_text)
    }

    /// Extract text from DOCX using docx-rs
    fn extract_docx(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let doc = docx_rs::read_docx(bytes).map_err(|e| ExtractionError::Parse {
            format: "docx",
            message: e.to_string(),
        })?;

        let mut all_text = String::new();
        for child in &doc.document.children {
            Self::extract_docx_content(child, &mut all_text);
        }
        Ok(all_text)
    }

    fn push_run(run: &docx_rs::Run, output: &mut String) {
        for run_child in &run.children {
            if let docx_rs::RunChild::Text(text) = run_child {
                output.push_str(&text.text);
            }
        }
    }

    fn push_paragraph(para: &docx_rs::Paragraph, output: &mut String) {
        for child in &para.children {
            match child {
                docx_rs::ParagraphChild::Run(run) => Self::push_run(run, output),
                docx_rs::ParagraphChild::Hyperlink(link) => {
                    for inner in &link.children {
                        if let docx_rs::ParagraphChild::Run(run) = inner {
                            Self::push_run(run, output);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Extract text from DOCX body elements; table cells are joined with ` | `
    fn extract_docx_content(element: &docx_rs::DocumentChild, output: &mut String) {
        match element {
            docx_rs::DocumentChild::Paragraph(para) => {
                Self::push_paragraph(para, output);
                output.push('\n');
            }
            docx_rs::DocumentChild::Table(table) => {
                for row in &table.rows {
                    let docx_rs::TableChild::TableRow(tr) = row;
                    for cell in &tr.cells {
                        let docx_rs::TableRowChild::TableCell(tc) = cell;
                        for child in &tc.children {
                            if let docx_rs::TableCellContent::Paragraph(para) = child {
                                Self::push_paragraph(para, output);
                            }
                        }
                        output.push_str(" | ");
                    }
                    output.push('\n');
                }
            }
            _ => {}
        }
    }

    /// Clean extracted text
    fn clean_text(text: &str) -> String {
        text.lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Cap text at `MAX_TEXT_LENGTH` characters
    fn cap_text(text: String) -> (String, bool) {
        match text.char_indices().nth(MAX_TEXT_LENGTH) {
            Some((cut, _)) => (text[..cut].to_string(), true),
            None => (text, false),
        }
    }
}

impl Extractor for DocumentParser {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractionError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase());

        let raw = match ext.as_deref() {
            Some(e) if Self::is_supported(Some(e)) => {
                let bytes = Self::read_bytes(path)?;
                self.extract_bytes(e, &bytes, false)?
            }
            other => {
                return Err(ExtractionError::Unsupported(
                    other.map(|e| format!(".{}", e)).unwrap_or_else(|| "(no extension)".to_string()),
                ))
            }
        };

        let (text, truncated) = Self::cap_text(Self::clean_text(&raw));

        tracing::debug!(
            path = %path.display(),
            chars = text.chars().count(),
            truncated,
            "Extracted text"
        );

        Ok(Extraction { text, truncated })
    }
}
