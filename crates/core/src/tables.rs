//! Turns extracted tables into declarative sentences.
//!
//! Plain tables become one sentence per data row. A *table family* (a
//! category label in the page prose followed by its table, repeated across
//! pages) becomes one sentence per populated cell, with the category, the
//! carried-forward subject and marker columns, the grade and the column
//! header spelled out.

use crate::chunking::normalize_whitespace;
use crate::extractor::{PageContent, Table};
use crate::models::{Document, DocumentKind};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::{debug, warn};

const SUBJECT_COLUMN: usize = 0;
const MARKER_COLUMN: usize = 1;
const GRADE_COLUMN: usize = 2;
const FIRST_VALUE_COLUMN: usize = 3;

/// One sentence per data row of a plain table, pairing key columns with
/// value columns.
pub fn plain_table_documents(source: &str, table: &Table) -> Vec<Document> {
    let Some((header, rows)) = table.rows.split_first() else {
        return Vec::new();
    };
    if header.len() < 2 || rows.is_empty() {
        return Vec::new();
    }

    let header: Vec<String> = header.iter().map(|cell| normalize_whitespace(cell)).collect();
    let key_columns = if header.len() >= 3 { 2 } else { 1 };

    rows.iter()
        .enumerate()
        .filter_map(|(index, row)| {
            if row.len() != header.len() {
                debug!(
                    source,
                    page = table.page,
                    row = index + 1,
                    cells = row.len(),
                    expected = header.len(),
                    "skipping table row with mismatched cell count"
                );
                return None;
            }
            row_sentence(&header, row, key_columns)
        })
        .map(|text| Document {
            text,
            source: source.to_string(),
            page: Some(table.page),
            kind: DocumentKind::TableRow,
            category: None,
        })
        .collect()
}

fn row_sentence(header: &[String], row: &[String], key_columns: usize) -> Option<String> {
    let pairs = header
        .iter()
        .zip(row.iter().map(|cell| normalize_whitespace(cell)))
        .enumerate()
        .filter(|(_, (column, value))| !column.is_empty() && !value.is_empty());

    let mut keys = Vec::new();
    let mut facts = Vec::new();
    for (index, (column, value)) in pairs {
        if index < key_columns {
            keys.push(format!("'{column}'이(가) '{value}'"));
        } else {
            facts.push(format!("{column}: {value}"));
        }
    }

    if facts.is_empty() {
        return None;
    }

    let facts = facts.join(", ");
    if keys.is_empty() {
        Some(format!("세부 내용은 다음과 같습니다: {facts}."))
    } else {
        Some(format!(
            "{}인 경우, 세부 내용은 다음과 같습니다: {facts}.",
            keys.join("이고 ")
        ))
    }
}

#[derive(Debug, PartialEq)]
pub enum FamilyOutcome {
    /// No category label occurs in the document.
    Absent,
    /// Labels and tables could not be paired one to one.
    Mismatch { categories: usize, tables: usize },
    Translated(Vec<Document>),
}

/// Pairs every category label found in page prose with the table at the
/// same position and translates each pair cell by cell.
///
/// Pairing is strictly positional, so any count mismatch drops the whole
/// document rather than risk attributing a table to the wrong category.
pub fn translate_table_family(
    source: &str,
    pages: &[PageContent],
    category_re: &Regex,
) -> FamilyOutcome {
    let mut categories = Vec::new();
    let mut tables = Vec::new();
    for page in pages {
        categories.extend(
            category_re
                .find_iter(&page.prose)
                .map(|found| strip_whitespace(found.as_str())),
        );
        tables.extend(page.tables.iter());
    }

    if categories.is_empty() {
        return FamilyOutcome::Absent;
    }

    if categories.len() != tables.len() {
        warn!(
            source,
            categories = categories.len(),
            tables = tables.len(),
            "category/table count mismatch, skipping table family parsing"
        );
        return FamilyOutcome::Mismatch {
            categories: categories.len(),
            tables: tables.len(),
        };
    }

    let documents = categories
        .iter()
        .zip(tables)
        .flat_map(|(category, table)| family_table_documents(source, category, table))
        .collect();

    FamilyOutcome::Translated(documents)
}

/// Translates one table of a family. The subject and marker columns are
/// carried forward row to row until a non-blank cell replaces them.
pub fn family_table_documents(source: &str, category: &str, table: &Table) -> Vec<Document> {
    let Some((header, rows)) = table.rows.split_first() else {
        return Vec::new();
    };

    let column_labels: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .skip(FIRST_VALUE_COLUMN)
        .map(|(index, cell)| (index, normalize_whitespace(cell)))
        .filter(|(_, label)| !label.is_empty())
        .collect();

    let mut subject: Option<String> = None;
    let mut marker: Option<String> = None;
    let mut documents = Vec::new();

    for row in rows {
        let cell = |index: usize| {
            row.get(index)
                .map(|value| normalize_whitespace(value))
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = cell(SUBJECT_COLUMN) {
            subject = Some(value);
        }
        if let Some(value) = cell(MARKER_COLUMN) {
            marker = Some(value);
        }
        let Some(grade) = cell(GRADE_COLUMN) else {
            continue;
        };

        for (index, label) in &column_labels {
            let Some(raw) = row.get(*index) else {
                continue;
            };
            let value = format_time_ranges(&strip_whitespace(raw));
            if value.is_empty() {
                continue;
            }

            let mut parts = vec![category.to_string()];
            parts.extend(subject.clone());
            parts.extend(marker.clone().filter(|marker| is_fail_marker(marker)));
            parts.push(grade.clone());
            parts.push(label.clone());

            documents.push(Document {
                text: format!("{} 기준은 {value}입니다.", parts.join(" ")),
                source: source.to_string(),
                page: Some(table.page),
                kind: DocumentKind::ComplexTableRow,
                category: Some(category.to_string()),
            });
        }
    }

    documents
}

fn is_fail_marker(marker: &str) -> bool {
    marker.contains("불합격") || marker.to_lowercase().contains("fail")
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|ch| !ch.is_whitespace()).collect()
}

fn time_pattern() -> &'static Regex {
    static TIME: OnceLock<Regex> = OnceLock::new();
    TIME.get_or_init(|| {
        Regex::new(r"\d+(?::\d+)*(?:-\d+(?::\d+)*)?").expect("TIME regex is valid")
    })
}

/// Rewrites standalone `M:S` and `M:S-M:S` tokens into worded minutes and
/// seconds. Digit runs of any other shape, such as `1:05:30`, are kept as is.
pub fn format_time_ranges(value: &str) -> String {
    time_pattern()
        .replace_all(value, |captures: &Captures| {
            let token = &captures[0];
            let worded = match token.split_once('-') {
                Some((start, end)) => word_time(start)
                    .zip(word_time(end))
                    .map(|(start, end)| format!("{start} - {end}")),
                None => word_time(token),
            };
            worded.unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}

fn word_time(token: &str) -> Option<String> {
    let (minutes, seconds) = token.split_once(':')?;
    let shaped = (1..=2).contains(&minutes.len())
        && seconds.len() == 2
        && !seconds.contains(':');
    shaped.then(|| format!("{minutes}분 {seconds}초"))
}
