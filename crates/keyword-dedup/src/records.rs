//! Tabular keyword files: the two-column `keyword, score` list and the
//! tab-separated map export produced by bibliometric mapping tools.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use keyword_types::{KeywordOutput, KeywordRecord, Score};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub const CSV_HEADER: &str = "keyword, total link strength";

/// Columns of the map export that hold the keyword and its score.
const EXPORT_KEY_COLUMN: usize = 1;
const EXPORT_SCORE_COLUMN: usize = 3;

/// Why a single row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RecordFault {
    #[error("missing score")]
    MissingScore,
    #[error("non-numeric score {0:?}")]
    InvalidScore(String),
    #[error("empty keyword")]
    EmptyKey,
    #[error("expected at least {expected} columns, found {found}")]
    MissingColumn { expected: usize, found: usize },
}

/// A malformed input row. Only that row is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("line {line}: {fault}")]
pub struct RecordParseError {
    pub line: usize,
    pub fault: RecordFault,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedRecords {
    pub records: Vec<KeywordRecord>,
    pub rejected: Vec<RecordParseError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputFormat {
    /// `keyword, score` with a header row.
    #[default]
    Csv,
    /// Tab-separated map export (id, label, occurrences, total link strength, ...).
    MapExport,
}

impl FromStr for InputFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "csv" => Ok(InputFormat::Csv),
            "map" | "map-export" | "vosviewer" | "tsv" => Ok(InputFormat::MapExport),
            other => Err(format!("unknown input format {other:?} (expected csv or map-export)")),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputFormat::Csv => "csv",
            InputFormat::MapExport => "map-export",
        })
    }
}

pub fn parse_records(text: &str, format: InputFormat) -> ParsedRecords {
    let parsed = match format {
        InputFormat::Csv => parse_rows(text, parse_csv_row),
        InputFormat::MapExport => parse_rows(text, parse_export_row),
    };
    for err in &parsed.rejected {
        warn!("skipping row: {err}");
    }
    info!(
        "parsed {} records ({} rejected)",
        parsed.records.len(),
        parsed.rejected.len()
    );
    parsed
}

fn parse_rows<F>(text: &str, parse_row: F) -> ParsedRecords
where
    F: Fn(&str) -> Result<KeywordRecord, RecordFault>,
{
    let mut parsed = ParsedRecords::default();
    let rows = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .skip(1);
    for (idx, line) in rows {
        match parse_row(line) {
            Ok(record) => parsed.records.push(record),
            Err(fault) => parsed.rejected.push(RecordParseError {
                line: idx + 1,
                fault,
            }),
        }
    }
    parsed
}

/// The score follows the last comma, so keywords may themselves contain commas.
fn parse_csv_row(line: &str) -> Result<KeywordRecord, RecordFault> {
    let (key, score) = line.rsplit_once(',').ok_or(RecordFault::MissingScore)?;
    build_record(key, score)
}

fn parse_export_row(line: &str) -> Result<KeywordRecord, RecordFault> {
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() <= EXPORT_SCORE_COLUMN {
        return Err(RecordFault::MissingColumn {
            expected: EXPORT_SCORE_COLUMN + 1,
            found: columns.len(),
        });
    }
    build_record(columns[EXPORT_KEY_COLUMN], columns[EXPORT_SCORE_COLUMN])
}

fn build_record(key: &str, score: &str) -> Result<KeywordRecord, RecordFault> {
    let key = key.trim();
    if key.is_empty() {
        return Err(RecordFault::EmptyKey);
    }
    Ok(KeywordRecord::new(key, parse_score(score)?))
}

/// Parse a non-negative integer score.
pub fn parse_score(raw: &str) -> Result<Score, RecordFault> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(RecordFault::MissingScore);
    }
    raw.parse::<Score>()
        .map_err(|_| RecordFault::InvalidScore(raw.to_string()))
}

/// Write records in the two-column format, header first.
pub fn write_csv<'a, W, I>(mut out: W, records: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a KeywordRecord>,
{
    writeln!(out, "{CSV_HEADER}")?;
    for record in records {
        writeln!(out, "{}, {}", record.key, record.score)?;
    }
    out.flush()
}

pub fn to_csv_string<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = &'a KeywordRecord>,
{
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_csv(&mut buf, records);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Write outputs as a pretty-printed JSON array of `{ "k", "t" }`.
pub fn write_json<W: Write>(out: W, outputs: &[KeywordOutput]) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(out, outputs)
}

/// Convert a map export into the two-column format.
pub fn export_to_csv(text: &str) -> (String, Vec<RecordParseError>) {
    let parsed = parse_records(text, InputFormat::MapExport);
    (to_csv_string(&parsed.records), parsed.rejected)
}
