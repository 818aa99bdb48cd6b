use crate::error::IngestError;
use crate::extractor::{extract_page_contents, PageContent};
use crate::models::{Document, IngestionOptions};
use crate::tables::{plain_table_documents, translate_table_family, FamilyOutcome};
use encoding_rs::Encoding;
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusFileKind {
    Text,
    Pdf,
}

impl CorpusFileKind {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|ext| ext.to_str())?;
        if ext.eq_ignore_ascii_case("txt") {
            Some(Self::Text)
        } else if ext.eq_ignore_ascii_case("pdf") {
            Some(Self::Pdf)
        } else {
            None
        }
    }
}

pub fn discover_corpus_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if CorpusFileKind::from_path(entry.path()).is_some() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Reads a text file as UTF-8, falling back to each legacy encoding in turn.
pub fn read_text_file(path: &Path, legacy: &[&'static Encoding]) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    decode_text(&bytes, legacy)
        .ok_or_else(|| IngestError::UnsupportedEncoding(path.display().to_string()))
}

fn decode_text(bytes: &[u8], legacy: &[&'static Encoding]) -> Option<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.to_string());
    }

    legacy.iter().find_map(|encoding| {
        encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
    })
}

/// Converts the extracted pages of one PDF into documents: page prose as
/// text documents, tables as family sentences when the document carries a
/// consistent table family, plain row sentences otherwise.
pub fn documents_from_pages(source: &str, pages: &[PageContent], category_re: &Regex) -> Vec<Document> {
    let mut documents: Vec<Document> = pages
        .iter()
        .filter(|page| !page.prose.is_empty())
        .map(|page| Document::text(page.prose.clone(), source, Some(page.number)))
        .collect();

    match translate_table_family(source, pages, category_re) {
        FamilyOutcome::Translated(family) => documents.extend(family),
        FamilyOutcome::Absent | FamilyOutcome::Mismatch { .. } => {
            for table in pages.iter().flat_map(|page| page.tables.iter()) {
                documents.extend(plain_table_documents(source, table));
            }
        }
    }

    documents
}

#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedFile>,
    pub failed_pages: usize,
}

struct FileOutcome {
    documents: Vec<Document>,
    failed_pages: usize,
}

fn read_corpus_file(
    path: &Path,
    options: &IngestionOptions,
    category_re: &Regex,
) -> Result<FileOutcome, IngestError> {
    let source = path.to_string_lossy().to_string();
    match CorpusFileKind::from_path(path) {
        Some(CorpusFileKind::Text) => {
            let text = read_text_file(path, &options.legacy_encodings)?;
            let documents = if text.trim().is_empty() {
                Vec::new()
            } else {
                vec![Document::text(text, source, None)]
            };
            Ok(FileOutcome {
                documents,
                failed_pages: 0,
            })
        }
        Some(CorpusFileKind::Pdf) => {
            let extracted = extract_page_contents(path)?;
            Ok(FileOutcome {
                documents: documents_from_pages(&source, &extracted.pages, category_re),
                failed_pages: extracted.failed_pages.len(),
            })
        }
        None => Err(IngestError::InvalidArgument(format!(
            "unsupported file type: {}",
            path.display()
        ))),
    }
}

/// Loads every `.txt` and `.pdf` under `folder`. Files that cannot be read
/// are reported and skipped; only a folder without any corpus files fails.
pub fn load_documents_best_effort(
    folder: &Path,
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError> {
    let files = discover_corpus_files(folder);

    if files.is_empty() {
        return Err(IngestError::NoDocuments(folder.display().to_string()));
    }

    let category_re = Regex::new(&options.category_pattern)?;

    let outcomes: Vec<(PathBuf, Result<FileOutcome, IngestError>)> = files
        .into_par_iter()
        .map(|path| {
            let outcome = read_corpus_file(&path, options, &category_re);
            (path, outcome)
        })
        .collect();

    let mut report = IngestionReport::default();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(file) => {
                report.failed_pages += file.failed_pages;
                report.documents.extend(file.documents);
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable file");
                report.skipped_files.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    info!(
        folder = %folder.display(),
        documents = report.documents.len(),
        skipped_files = report.skipped_files.len(),
        failed_pages = report.failed_pages,
        "corpus loaded"
    );
    Ok(report)
}

pub fn load_documents(folder: &Path, options: &IngestionOptions) -> Result<Vec<Document>, IngestError> {
    let report = load_documents_best_effort(folder, options)?;
    if report.documents.is_empty() {
        return Err(IngestError::NoDocuments(folder.display().to_string()));
    }
    Ok(report.documents)
}
