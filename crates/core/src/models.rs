use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Pdf,
    Docx,
    Json,
    Csv,
}

impl SourceFormat {
    /// Matches the file extension case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Json => "json",
            Self::Csv => "csv",
        };
        f.write_str(name)
    }
}

/// Where a record sits inside its source file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "index", rename_all = "lowercase")]
pub enum RecordLocation {
    Document,
    Page(u32),
    Element(usize),
    Row(usize),
}

impl fmt::Display for RecordLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Page(page) => write!(f, "page {page}"),
            Self::Element(index) => write!(f, "element {index}"),
            Self::Row(index) => write!(f, "row {index}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextRecord {
    pub source_path: String,
    pub format: SourceFormat,
    pub location: RecordLocation,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub source_path: String,
    pub format: SourceFormat,
    pub location: RecordLocation,
    pub record_index: u64,
    pub chunk_index: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub sequence: u64,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub source_path: String,
    pub location: RecordLocation,
    pub text: String,
    pub score: f64,
}

impl From<ScoredEntry> for RetrievedChunk {
    fn from(value: ScoredEntry) -> Self {
        let chunk = value.entry.chunk;
        Self {
            chunk_id: chunk.chunk_id,
            source_path: chunk.source_path,
            location: chunk.location,
            text: chunk.text,
            score: value.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub query: String,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection_ignores_case() {
        assert_eq!(
            SourceFormat::from_path(Path::new("/docs/Report.PDF")),
            Some(SourceFormat::Pdf)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("people.Csv")),
            Some(SourceFormat::Csv)
        );
        assert_eq!(SourceFormat::from_path(Path::new("notes.txt")), None);
        assert_eq!(SourceFormat::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn location_serializes_with_tag() -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_string(&RecordLocation::Page(3))?;
        assert_eq!(encoded, r#"{"kind":"page","index":3}"#);
        let decoded: RecordLocation = serde_json::from_str(r#"{"kind":"document"}"#)?;
        assert_eq!(decoded, RecordLocation::Document);
        Ok(())
    }
}
