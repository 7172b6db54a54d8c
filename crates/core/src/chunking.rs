use crate::error::IngestError;
use crate::models::{Chunk, TextRecord};
use regex::Regex;
use sha2::{Digest, Sha256};

pub const DEFAULT_CHUNK_MAX_CHARS: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_MAX_CHARS,
            overlap_chars: DEFAULT_CHUNK_OVERLAP_CHARS,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Splits records into overlapping, size-bounded chunks.
///
/// Sizes are counted in `char`s. A cut prefers, in order: a blank line, a
/// line break, the end of a sentence, any whitespace. Without one of those in
/// the back half of the window the text is cut at exactly `max_chars`.
/// Consecutive chunks of one record always share exactly `overlap_chars`.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    sentence_end: Regex,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            config,
            sentence_end: Regex::new(r#"[.!?]['")\]]*\s"#)?,
        })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.config.max_chars {
            return vec![text.to_string()];
        }

        let mut pieces = Vec::new();
        let mut start = 0;
        loop {
            if chars.len() - start <= self.config.max_chars {
                pieces.push(chars[start..].iter().collect());
                break;
            }

            let cut = self.find_cut(&chars, start);
            pieces.push(chars[start..cut].iter().collect());
            start = cut - self.config.overlap_chars;
        }

        pieces
    }

    /// Chunks never span records; `record_index` is the record's position in
    /// `records`.
    pub fn split_records(&self, records: &[TextRecord]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for (record_index, record) in records.iter().enumerate() {
            let record_index = record_index as u64;
            for (chunk_index, text) in self.split_text(&record.text).into_iter().enumerate() {
                let chunk_index = chunk_index as u32;
                chunks.push(Chunk {
                    chunk_id: make_chunk_id(&record.source_path, record_index, chunk_index, &text),
                    source_path: record.source_path.clone(),
                    format: record.format,
                    location: record.location,
                    record_index,
                    chunk_index,
                    text,
                });
            }
        }

        chunks
    }

    // Returns an end index in (start + overlap, start + max] so the next
    // chunk always advances.
    fn find_cut(&self, chars: &[char], start: usize) -> usize {
        let end = start + self.config.max_chars;
        let lower = start + (self.config.overlap_chars + 1).max(self.config.max_chars / 2);

        let last_where = |predicate: &dyn Fn(usize) -> bool| (lower..=end).rev().find(|&cut| predicate(cut));

        last_where(&|cut| cut >= 2 && chars[cut - 1] == '\n' && chars[cut - 2] == '\n')
            .or_else(|| last_where(&|cut| chars[cut - 1] == '\n'))
            .or_else(|| self.last_sentence_end(chars, start, lower, end))
            .or_else(|| last_where(&|cut| chars[cut - 1].is_whitespace()))
            .unwrap_or(end)
    }

    fn last_sentence_end(&self, chars: &[char], start: usize, lower: usize, end: usize) -> Option<usize> {
        let window: String = chars[start..end].iter().collect();
        self.sentence_end
            .find_iter(&window)
            .map(|found| start + window[..found.end()].chars().count())
            .filter(|&cut| cut >= lower)
            .last()
    }
}

fn make_chunk_id(source_path: &str, record_index: u64, chunk_index: u32, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(record_index.to_le_bytes());
    hasher.update(chunk_index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordLocation, SourceFormat};

    fn record(path: &str, text: &str) -> TextRecord {
        TextRecord {
            source_path: path.to_string(),
            format: SourceFormat::Json,
            location: RecordLocation::Document,
            text: text.to_string(),
        }
    }

    fn tail(text: &str, count: usize) -> String {
        let chars: Vec<char> = text.chars().collect();
        chars[chars.len() - count..].iter().collect()
    }

    fn head(text: &str, count: usize) -> String {
        text.chars().take(count).collect()
    }

    fn assert_chunk_invariants(text: &str, pieces: &[String], config: ChunkingConfig) {
        let mut rebuilt = String::new();
        for (index, piece) in pieces.iter().enumerate() {
            assert!(piece.chars().count() <= config.max_chars);
            if index == 0 {
                rebuilt.push_str(piece);
            } else {
                assert_eq!(
                    tail(&pieces[index - 1], config.overlap_chars),
                    head(piece, config.overlap_chars)
                );
                rebuilt.extend(piece.chars().skip(config.overlap_chars));
            }
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_max() {
        let config = ChunkingConfig {
            max_chars: 100,
            overlap_chars: 100,
        };
        assert!(matches!(
            Chunker::new(config),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert!(Chunker::new(ChunkingConfig {
            max_chars: 0,
            overlap_chars: 0
        })
        .is_err());
    }

    #[test]
    fn short_record_is_a_single_chunk() -> Result<(), IngestError> {
        let chunker = Chunker::new(ChunkingConfig::default())?;
        let pieces = chunker.split_text("Short note.");
        assert_eq!(pieces, vec!["Short note.".to_string()]);
        Ok(())
    }

    #[test]
    fn blank_record_has_no_chunks() -> Result<(), IngestError> {
        let chunker = Chunker::new(ChunkingConfig::default())?;
        assert!(chunker.split_text(" \n\t ").is_empty());
        Ok(())
    }

    #[test]
    fn unbroken_text_uses_hard_cuts_with_exact_overlap() -> Result<(), IngestError> {
        let config = ChunkingConfig::default();
        let chunker = Chunker::new(config)?;
        let text: String = "abcdefghij".repeat(200);

        let pieces = chunker.split_text(&text);

        // ceil((2000 - 100) / (500 - 100))
        assert_eq!(pieces.len(), 5);
        assert_eq!(pieces[0].chars().count(), 500);
        assert_eq!(tail(&pieces[0], 100), head(&pieces[1], 100));
        assert_chunk_invariants(&text, &pieces, config);
        Ok(())
    }

    #[test]
    fn prefers_paragraph_breaks() -> Result<(), IngestError> {
        let config = ChunkingConfig {
            max_chars: 40,
            overlap_chars: 5,
        };
        let chunker = Chunker::new(config)?;
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));

        let pieces = chunker.split_text(&text);

        assert_eq!(pieces.len(), 2);
        assert!(pieces[0].ends_with("\n\n"));
        assert!(pieces[1].ends_with(&"b".repeat(30)));
        assert_chunk_invariants(&text, &pieces, config);
        Ok(())
    }

    #[test]
    fn falls_back_to_sentence_then_word_boundaries() -> Result<(), IngestError> {
        let config = ChunkingConfig {
            max_chars: 40,
            overlap_chars: 10,
        };
        let chunker = Chunker::new(config)?;
        let text = "The pump failed at noon. Pressure dropped to zero within minutes! \
                    Operators restarted the line after an inspection of every valve and seal.";

        let pieces = chunker.split_text(text);

        assert!(pieces.len() > 1);
        assert!(pieces[0].ends_with("noon. "));
        assert_chunk_invariants(text, &pieces, config);
        Ok(())
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() -> Result<(), IngestError> {
        let config = ChunkingConfig {
            max_chars: 7,
            overlap_chars: 2,
        };
        let chunker = Chunker::new(config)?;
        let text = "ĉiuĵaŭdeŝanĝoĥoro";

        let pieces = chunker.split_text(text);

        assert_chunk_invariants(text, &pieces, config);
        Ok(())
    }

    #[test]
    fn chunks_never_span_records() -> Result<(), IngestError> {
        let config = ChunkingConfig {
            max_chars: 10,
            overlap_chars: 2,
        };
        let chunker = Chunker::new(config)?;
        let records = vec![record("a.json", "0123456789abcdef"), record("b.json", "short")];

        let chunks = chunker.split_records(&records);

        assert_eq!(chunks.len(), 3);
        assert!(chunks[..2].iter().all(|chunk| chunk.source_path == "a.json"));
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[2].source_path, "b.json");
        assert_eq!(chunks[2].record_index, 1);
        assert_eq!(chunks[2].chunk_index, 0);
        assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
        Ok(())
    }
}
