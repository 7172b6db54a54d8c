use crate::error::IngestError;
use crate::models::{RecordLocation, SourceFormat, TextRecord};
use lopdf::Document;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| IngestError::parse(path, error))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(text) => pages.push(PageText {
                    number: page_no,
                    text,
                }),
                Err(error) => {
                    warn!(path = %path.display(), page = page_no, %error, "page text unreadable, dropping");
                }
            }
        }

        Ok(pages)
    }
}

/// Reads a supported file into text records, in document order.
pub fn parse_document(path: &Path) -> Result<Vec<TextRecord>, IngestError> {
    let format = SourceFormat::from_path(path)
        .ok_or_else(|| IngestError::UnsupportedFormat(path.display().to_string()))?;

    info!(path = %path.display(), %format, "parsing document");

    match format {
        SourceFormat::Pdf => parse_pdf(path, &LopdfExtractor),
        SourceFormat::Docx => parse_docx(path),
        SourceFormat::Json => parse_json(path),
        SourceFormat::Csv => parse_csv(path),
    }
}

pub fn parse_pdf(path: &Path, extractor: &dyn PdfExtractor) -> Result<Vec<TextRecord>, IngestError> {
    let pages = extractor.extract_pages(path)?;
    Ok(records_from_pages(path, pages))
}

fn records_from_pages(path: &Path, pages: Vec<PageText>) -> Vec<TextRecord> {
    pages
        .into_iter()
        .filter(|page| !page.text.trim().is_empty())
        .map(|page| TextRecord {
            source_path: path.to_string_lossy().to_string(),
            format: SourceFormat::Pdf,
            location: RecordLocation::Page(page.number),
            text: page.text,
        })
        .collect()
}

pub fn parse_docx(path: &Path) -> Result<Vec<TextRecord>, IngestError> {
    let bytes = fs::read(path)?;
    let docx = docx_rs::read_docx(&bytes).map_err(|error| IngestError::parse(path, error))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            let mut text = String::new();
            push_paragraph_text(&paragraph.children, &mut text);
            if !text.trim().is_empty() {
                paragraphs.push(text);
            }
        }
    }

    if paragraphs.is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![TextRecord {
        source_path: path.to_string_lossy().to_string(),
        format: SourceFormat::Docx,
        location: RecordLocation::Document,
        text: paragraphs.join("\n"),
    }])
}

/// Appends the visible text of a paragraph, hyperlink runs included.
fn push_paragraph_text(children: &[docx_rs::ParagraphChild], text: &mut String) {
    for child in children {
        match child {
            docx_rs::ParagraphChild::Run(run) => {
                for child in &run.children {
                    match child {
                        docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                        docx_rs::RunChild::Tab(_) => text.push('\t'),
                        docx_rs::RunChild::Break(_) | docx_rs::RunChild::CarriageReturn(_) => {
                            text.push('\n')
                        }
                        _ => {}
                    }
                }
            }
            docx_rs::ParagraphChild::Hyperlink(link) => push_paragraph_text(&link.children, text),
            _ => {}
        }
    }
}

pub fn parse_json(path: &Path) -> Result<Vec<TextRecord>, IngestError> {
    let content = read_utf8(path)?;
    let value: Value =
        serde_json::from_str(&content).map_err(|error| IngestError::parse(path, error))?;
    json_records(path, value)
}

fn json_records(path: &Path, value: Value) -> Result<Vec<TextRecord>, IngestError> {
    let source_path = path.to_string_lossy().to_string();
    let record = |location, value: &Value| -> Result<TextRecord, IngestError> {
        Ok(TextRecord {
            source_path: source_path.clone(),
            format: SourceFormat::Json,
            location,
            text: serde_json::to_string_pretty(value)
                .map_err(|error| IngestError::parse(path, error))?,
        })
    };

    match &value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| record(RecordLocation::Element(index), item))
            .collect(),
        Value::Object(_) => Ok(vec![record(RecordLocation::Document, &value)?]),
        _ => Err(IngestError::parse(path, "unsupported JSON structure")),
    }
}

pub fn parse_csv(path: &Path) -> Result<Vec<TextRecord>, IngestError> {
    let content = read_utf8(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|error| IngestError::parse(path, error))?
        .clone();

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|error| IngestError::parse(path, error))?;
        let mapping = row_mapping(&headers, &row);
        let text = serde_json::to_string_pretty(&Value::Object(mapping))
            .map_err(|error| IngestError::parse(path, error))?;

        records.push(TextRecord {
            source_path: path.to_string_lossy().to_string(),
            format: SourceFormat::Csv,
            location: RecordLocation::Row(index),
            text,
        });
    }

    Ok(records)
}

/// Header-keyed mapping for one row. Missing cells become `null`; surplus
/// cells are collected under the `"null"` key.
fn row_mapping(headers: &csv::StringRecord, row: &csv::StringRecord) -> Map<String, Value> {
    let mut mapping = Map::new();
    for (position, header) in headers.iter().enumerate() {
        let value = row
            .get(position)
            .map(|cell| Value::String(cell.to_string()))
            .unwrap_or(Value::Null);
        mapping.insert(header.to_string(), value);
    }

    if row.len() > headers.len() {
        let surplus = row
            .iter()
            .skip(headers.len())
            .map(|cell| Value::String(cell.to_string()))
            .collect();
        mapping.insert("null".to_string(), Value::Array(surplus));
    }

    mapping
}

fn read_utf8(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|error| IngestError::parse(path, error))
}
