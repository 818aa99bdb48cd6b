use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::warn;

/// Rows of cells as extracted from one page. Blank cells are empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub page: u32,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub number: u32,
    pub prose: String,
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedPdf {
    pub pages: Vec<PageContent>,
    pub failed_pages: Vec<u32>,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<ExtractedPdf, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<ExtractedPdf, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut extracted = ExtractedPdf::default();
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(text) => extracted.pages.push(split_page_text(page_no, &text)),
                Err(error) => {
                    warn!(path = %path.display(), page = page_no, %error, "skipping unreadable pdf page");
                    extracted.failed_pages.push(page_no);
                }
            }
        }

        if extracted.pages.is_empty() && extracted.failed_pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }

        Ok(extracted)
    }
}

pub fn extract_page_contents(path: &Path) -> Result<ExtractedPdf, IngestError> {
    LopdfExtractor.extract_pages(path)
}

/// Separates ruled table blocks from prose. A table is a run of at least two
/// consecutive lines that each split into two or more cells on `|` or tab.
pub fn split_page_text(number: u32, text: &str) -> PageContent {
    let mut prose = Vec::new();
    let mut tables = Vec::new();
    let mut pending: Vec<(&str, Vec<String>)> = Vec::new();

    for line in text.lines() {
        match split_cells(line) {
            Some(cells) => pending.push((line, cells)),
            None => {
                flush_block(number, &mut pending, &mut prose, &mut tables);
                prose.push(line.trim_end().to_string());
            }
        }
    }
    flush_block(number, &mut pending, &mut prose, &mut tables);

    PageContent {
        number,
        prose: prose.join("\n").trim().to_string(),
        tables,
    }
}

fn flush_block(
    page: u32,
    pending: &mut Vec<(&str, Vec<String>)>,
    prose: &mut Vec<String>,
    tables: &mut Vec<Table>,
) {
    if pending.len() >= 2 {
        tables.push(Table {
            page,
            rows: pending.drain(..).map(|(_, cells)| cells).collect(),
        });
    } else {
        prose.extend(pending.drain(..).map(|(line, _)| line.trim_end().to_string()));
    }
}

fn split_cells(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    let separator = if trimmed.contains('|') {
        '|'
    } else if trimmed.contains('\t') {
        '\t'
    } else {
        return None;
    };

    let inner = trimmed.strip_prefix(separator).unwrap_or(trimmed);
    let inner = inner.strip_suffix(separator).unwrap_or(inner);
    let cells: Vec<String> = inner
        .split(separator)
        .map(|cell| cell.trim().to_string())
        .collect();

    (cells.len() >= 2).then_some(cells)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::path::Path;

    /// Writes a Courier-text PDF with one page per entry. `None` produces a
    /// page whose content stream reference points at a missing object.
    pub(crate) fn write_pdf(
        path: &Path,
        pages: &[Option<&[&str]>],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for lines in pages {
            let contents = match lines {
                Some(lines) => {
                    let mut operations = Vec::new();
                    for (row, line) in lines.iter().enumerate() {
                        operations.push(Operation::new("BT", vec![]));
                        operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                        operations.push(Operation::new(
                            "Td",
                            vec![72.into(), (720 - 20 * row as i64).into()],
                        ));
                        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                        operations.push(Operation::new("ET", vec![]));
                    }
                    let content = Content { operations };
                    Object::Reference(doc.add_object(Stream::new(dictionary! {}, content.encode()?)))
                }
                None => Object::Reference((9999, 0)),
            };
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => contents,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path)?;
        Ok(())
    }
}
