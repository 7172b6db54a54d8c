use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::embeddings::Embedder;
use crate::extractor::parse_document;
use crate::store::EmbeddingStore;
use crate::stores::LocalVectorStore;
use crate::traits::VectorIndex;
use crate::{IngestError, SourceFormat, TextRecord};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct DiscoveredFiles {
    pub supported: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Default)]
pub struct ParsedFolder {
    pub records: Vec<TextRecord>,
    pub parsed_files: Vec<PathBuf>,
    pub skipped_files: Vec<SkippedFile>,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub parsed_files: Vec<PathBuf>,
    pub record_count: usize,
    pub chunk_count: usize,
    pub skipped_files: Vec<SkippedFile>,
}

/// Lists the folder's direct children; subdirectories are not entered.
pub fn discover_documents(folder: &Path) -> Result<DiscoveredFiles, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "documents folder not found: {}",
            folder.display()
        )));
    }

    let mut discovered = DiscoveredFiles::default();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path().to_path_buf();
        if SourceFormat::from_path(&path).is_some() {
            discovered.supported.push(path);
        } else {
            warn!(path = %path.display(), "skipping file with unsupported extension");
            discovered.skipped.push(SkippedFile {
                path,
                reason: "unsupported extension".to_string(),
            });
        }
    }

    Ok(discovered)
}

/// Parses every supported file. A file that fails is reported and skipped;
/// the rest of the batch continues.
pub fn parse_folder(folder: &Path) -> Result<ParsedFolder, IngestError> {
    info!(folder = %folder.display(), "ingesting files");
    let discovered = discover_documents(folder)?;

    let mut parsed = ParsedFolder {
        skipped_files: discovered.skipped,
        ..ParsedFolder::default()
    };

    for path in discovered.supported {
        match parse_document(&path) {
            Ok(records) => {
                info!(path = %path.display(), records = records.len(), "parsed");
                parsed.records.extend(records);
                parsed.parsed_files.push(path);
            }
            Err(error) if error.is_file_local() => {
                warn!(path = %path.display(), %error, "skipping unreadable file");
                parsed.skipped_files.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
            }
            Err(error) => return Err(error),
        }
    }

    Ok(parsed)
}

/// Parses, chunks and stores a folder. Always additive: running it twice
/// stores every chunk twice.
pub fn ingest_folder<E, V>(
    folder: &Path,
    chunker: &Chunker,
    store: &mut EmbeddingStore<E, V>,
) -> Result<IngestionReport, IngestError>
where
    E: Embedder,
    V: VectorIndex,
{
    let parsed = parse_folder(folder)?;

    info!(records = parsed.records.len(), "splitting documents into chunks");
    let chunks = chunker.split_records(&parsed.records);

    info!(chunks = chunks.len(), "storing chunks");
    let chunk_count = store.add(&chunks)?;

    if parsed.parsed_files.is_empty() {
        warn!(folder = %folder.display(), "no documents were ingested");
    }

    Ok(IngestionReport {
        parsed_files: parsed.parsed_files,
        record_count: parsed.records.len(),
        chunk_count,
        skipped_files: parsed.skipped_files,
    })
}

/// Opens the configured store, ingesting the documents folder first if no
/// index exists yet. An existing index is used as is, however old.
pub fn open_or_ingest<E>(
    config: &RagConfig,
    embedder: E,
) -> Result<(EmbeddingStore<E, LocalVectorStore>, Option<IngestionReport>), IngestError>
where
    E: Embedder,
{
    if LocalVectorStore::exists(&config.store_dir) {
        info!(store = %config.store_dir.display(), "vector store already exists, skipping ingestion");
        let store = EmbeddingStore::open(embedder, &config.store_dir)?;
        return Ok((store, None));
    }

    info!(store = %config.store_dir.display(), "vector store not found, ingesting documents");
    let chunker = Chunker::new(config.chunking)?;
    let mut store = EmbeddingStore::open(embedder, &config.store_dir)?;
    let report = ingest_folder(&config.documents_dir, &chunker, &mut store)?;
    Ok((store, Some(report)))
}
