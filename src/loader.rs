//! CSV loading for the command-line shell.
//!
//! Maps raw source headers onto the logical column names the engine expects
//! and repairs headers that were UTF-8 decoded as Latin-1 on the way in.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use crate::config::LoaderConfig;
use crate::models::{
    RawRow, RawTable, COL_DATE, COL_DEW_POINT, COL_MAX_TEMP, COL_MIN_TEMP, COL_MONTH,
    COL_PRECIPITATION, COL_RADIATION, COL_REGION, COL_YEAR,
};

/// Known source headers (lowercased), including the INMET hourly export names.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("regiao", COL_REGION),
    ("região", COL_REGION),
    ("ano", COL_YEAR),
    ("mes", COL_MONTH),
    ("mês", COL_MONTH),
    ("data", COL_DATE),
    ("data medicao", COL_DATE),
    ("temperatura máxima na hora ant. (aut) (°c)", COL_MAX_TEMP),
    ("temperatura mínima na hora ant. (aut) (°c)", COL_MIN_TEMP),
    ("temperatura do ponto de orvalho (°c)", COL_DEW_POINT),
    ("precipitação total, horário (mm)", COL_PRECIPITATION),
    ("radiacao global (kj/m²)", COL_RADIATION),
    ("radiação global (kj/m²)", COL_RADIATION),
];

const LOGICAL_COLUMNS: [&str; 9] = [
    COL_REGION,
    COL_YEAR,
    COL_MONTH,
    COL_DATE,
    COL_MAX_TEMP,
    COL_MIN_TEMP,
    COL_DEW_POINT,
    COL_PRECIPITATION,
    COL_RADIATION,
];

pub fn load_table(path: &Path, config: &LoaderConfig) -> anyhow::Result<RawTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let table = read_table(file, config)
        .with_context(|| format!("failed to read observations from {}", path.display()))?;
    info!(
        path = %path.display(),
        rows = table.rows.len(),
        columns = table.columns.len(),
        "loaded observation table"
    );
    Ok(table)
}

pub fn read_table<R: Read>(reader: R, config: &LoaderConfig) -> anyhow::Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = reader
        .byte_headers()
        .context("missing header row")?
        .iter()
        .map(|raw| logical_name(&decode_field(raw), &config.column_aliases))
        .collect();
    debug!(?columns, "resolved header names");

    let mut rows = Vec::new();
    for result in reader.byte_records() {
        let record = result?;
        let mut row = RawRow::new();
        for (column, field) in columns.iter().zip(record.iter()) {
            let value = decode_field(field);
            // Duplicate headers keep the first non-blank cell.
            let slot = row.entry(column.clone()).or_default();
            if slot.trim().is_empty() {
                *slot = value;
            }
        }
        rows.push(row);
    }

    let mut unique = Vec::with_capacity(columns.len());
    for column in columns {
        if !unique.contains(&column) {
            unique.push(column);
        }
    }

    Ok(RawTable {
        columns: unique,
        rows,
    })
}

/// Decodes a cell as UTF-8, falling back to Latin-1 for legacy exports.
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|b| char::from(*b)).collect(),
    }
}

/// Windows-1252 characters in 0x80..=0x9F, which Latin-1 leaves as controls.
const CP1252_HIGH: [(char, u8); 27] = [
    ('€', 0x80), ('‚', 0x82), ('ƒ', 0x83), ('„', 0x84), ('…', 0x85), ('†', 0x86),
    ('‡', 0x87), ('ˆ', 0x88), ('‰', 0x89), ('Š', 0x8A), ('‹', 0x8B), ('Œ', 0x8C),
    ('Ž', 0x8E), ('‘', 0x91), ('’', 0x92), ('“', 0x93), ('”', 0x94), ('•', 0x95),
    ('–', 0x96), ('—', 0x97), ('˜', 0x98), ('™', 0x99), ('š', 0x9A), ('›', 0x9B),
    ('œ', 0x9C), ('ž', 0x9E), ('Ÿ', 0x9F),
];

/// Undoes UTF-8 text that was decoded as Windows-1252 or Latin-1
/// (`PRECIPITAÃ‡ÃƒO` → `PRECIPITAÇÃO`). Anything that does not re-encode to
/// valid UTF-8 is returned unchanged.
pub fn repair_mojibake(header: &str) -> String {
    if !header.contains(|c| c == 'Ã' || c == 'Â') {
        return header.to_string();
    }
    let bytes: Option<Vec<u8>> = header.chars().map(cp1252_byte).collect();
    bytes
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| header.to_string())
}

fn cp1252_byte(c: char) -> Option<u8> {
    CP1252_HIGH
        .iter()
        .find(|(high, _)| *high == c)
        .map(|(_, byte)| *byte)
        .or_else(|| u8::try_from(u32::from(c)).ok())
}

fn logical_name(raw: &str, aliases: &BTreeMap<String, String>) -> String {
    let repaired = repair_mojibake(raw.trim_start_matches('\u{feff}'));
    let header = repaired.trim();

    if let Some(target) = aliases
        .iter()
        .find(|(alias, _)| alias.trim().eq_ignore_ascii_case(header))
        .map(|(_, target)| target)
    {
        return target.clone();
    }

    let lowered = header.to_lowercase();
    if let Some(logical) = LOGICAL_COLUMNS
        .iter()
        .find(|name| name.to_lowercase() == lowered)
    {
        return (*logical).to_string();
    }
    BUILTIN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, logical)| (*logical).to_string())
        .unwrap_or_else(|| header.to_string())
}
