//! Office Open XML (`.xlsx`) worksheet reader.
//!
//! Sheet names are resolved through `xl/workbook.xml` and its relationship
//! part; cell values come from the worksheet XML and `xl/sharedStrings.xml`.

use super::{Table, TableLoader};
use crate::error::LoadError;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

/// Excel's sheet limits: 1,048,576 rows by 16,384 columns (`XFD`).
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

/// Largest dense grid built from one worksheet.
const MAX_GRID_CELLS: usize = 2_000_000;

/// Loads worksheets from `.xlsx` files on a blocking worker thread.
#[derive(Debug, Clone, Default)]
pub struct XlsxLoader;

#[async_trait]
impl TableLoader for XlsxLoader {
    async fn load_table(&self, path: &Path, sheet: Option<&str>) -> Result<Table, LoadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if ext == "xls" {
            return Err(LoadError::UnsupportedFormat(
                "legacy .xls (BIFF) workbooks cannot be read; save as .xlsx".to_string(),
            ));
        }

        let path: PathBuf = path.to_path_buf();
        let sheet = sheet.map(String::from);

        tokio::task::spawn_blocking(move || read_sheet(&path, sheet.as_deref()))
            .await
            .map_err(|e| LoadError::Join(e.to_string()))?
    }
}

/// A worksheet entry from the workbook manifest.
#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    part: String,
}

/// Reads one worksheet (by name, or the first one) from an `.xlsx` file.
pub fn read_sheet(path: &Path, sheet: Option<&str>) -> Result<Table, LoadError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let sheets = list_sheets(&mut archive)?;
    debug!(
        "Workbook {} has sheets: {:?}",
        path.display(),
        sheets.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
    );

    let entry = match sheet {
        Some(name) => sheets
            .iter()
            .find(|s| s.name == name)
            .or_else(|| sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name)))
            .ok_or_else(|| LoadError::SheetNotFound(name.to_string()))?,
        None => sheets.first().ok_or(LoadError::NoSheets)?,
    };

    let shared = match read_part(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => parse_shared_strings(&xml)?,
        Err(LoadError::Archive(zip::result::ZipError::FileNotFound)) => Vec::new(),
        Err(e) => return Err(e),
    };

    let xml = read_part(&mut archive, &entry.part)?;
    let grid = parse_worksheet(&entry.part, &xml, &shared)?;

    Ok(Table::from_grid(entry.name.clone(), grid))
}

/// Lists worksheets in workbook order.
fn list_sheets<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<SheetEntry>, LoadError> {
    let workbook = read_part(archive, "xl/workbook.xml")?;
    let targets = match read_part(archive, "xl/_rels/workbook.xml.rels") {
        Ok(rels) => parse_relationships(&rels)?,
        Err(_) => HashMap::new(),
    };

    let mut reader = Reader::from_str(&workbook);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                let name = attribute(e, b"name").unwrap_or_default();
                let rel_id = attribute(e, b"id");

                let part = rel_id
                    .and_then(|id| targets.get(&id).cloned())
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", sheets.len() + 1));

                sheets.push(SheetEntry { name, part });
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("xl/workbook.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    if sheets.is_empty() {
        return Err(LoadError::NoSheets);
    }

    Ok(sheets)
}

/// Maps relationship ids to archive part paths.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, LoadError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attribute(e, b"Id"), attribute(e, b"Target")) {
                    let part = match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    };
                    targets.insert(id, part);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("xl/_rels/workbook.xml.rels", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, LoadError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // Phonetic runs (<rPh>) repeat the text and are skipped.
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| xml_error("xl/sharedStrings.xml", err))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("xl/sharedStrings.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

/// Parses worksheet XML into a dense grid of display strings.
fn parse_worksheet(part: &str, xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, LoadError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut cells: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();

    let mut current_row = 0usize;
    let mut next_col = 0usize;
    let mut cell_pos = (0usize, 0usize);
    let mut cell_type = String::new();
    let mut value = String::new();
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    current_row = attribute(e, b"r")
                        .and_then(|r| r.parse::<usize>().ok())
                        .map(|r| r.saturating_sub(1))
                        .unwrap_or(current_row);
                    next_col = 0;
                }
                b"c" => {
                    cell_pos = cell_position(e, current_row, next_col);
                    if cell_pos.0 >= MAX_ROWS || cell_pos.1 >= MAX_COLUMNS {
                        let (row, col) = (cell_pos.0 + 1, cell_pos.1 + 1);
                        return Err(xml_error(
                            part,
                            format!("cell at row {} column {} is outside the sheet", row, col),
                        ));
                    }
                    cell_type = attribute(e, b"t").unwrap_or_default();
                    value.clear();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"c" => {
                let (_, col) = cell_position(e, current_row, next_col);
                next_col = col + 1;
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"row" => current_row += 1,
                b"c" => {
                    let display = cell_display(&cell_type, &value, shared);
                    if !display.is_empty() {
                        cells.entry(cell_pos.0).or_default().insert(cell_pos.1, display);
                    }
                    next_col = cell_pos.1 + 1;
                }
                b"v" | b"t" => in_value = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_value => {
                let text = e.unescape().map_err(|err| xml_error(part, err))?;
                value.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(part, e)),
            _ => {}
        }
        buf.clear();
    }

    // Rows keep their sheet position relative to the first populated row.
    let Some(&first_row) = cells.keys().next() else {
        return Ok(Vec::new());
    };
    let last_row = cells.keys().next_back().copied().unwrap_or(first_row);
    let width = cells
        .values()
        .filter_map(|row| row.keys().next_back())
        .max()
        .map(|c| c + 1)
        .unwrap_or(0);

    let height = last_row - first_row + 1;
    if height.saturating_mul(width) > MAX_GRID_CELLS {
        return Err(LoadError::TooLarge {
            part: part.to_string(),
            rows: height,
            columns: width,
        });
    }

    let grid = (first_row..=last_row)
        .map(|r| {
            let mut row = vec![String::new(); width];
            if let Some(values) = cells.get(&r) {
                for (&c, v) in values {
                    row[c] = v.clone();
                }
            }
            row
        })
        .collect();

    Ok(grid)
}

fn cell_position(e: &BytesStart<'_>, row: usize, next_col: usize) -> (usize, usize) {
    attribute(e, b"r")
        .and_then(|r| parse_cell_reference(&r))
        .unwrap_or((row, next_col))
}

fn cell_display(cell_type: &str, raw: &str, shared: &[String]) -> String {
    match cell_type {
        "s" => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i).cloned())
            .unwrap_or_default(),
        "b" => match raw.trim() {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        _ => raw.to_string(),
    }
}

/// Parses an `A1`-style reference into zero-based `(row, column)`.
pub(crate) fn parse_cell_reference(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    // Column letters run A..XFD.
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }

    let col = letters.chars().try_fold(0usize, |acc, c| {
        c.is_ascii_alphabetic()
            .then(|| acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1))
    })?;
    let row = digits.parse::<usize>().ok()?;

    Some((row.checked_sub(1)?, col - 1))
}

fn attribute(e: &BytesStart<'_>, local_name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local_name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String, LoadError> {
    let mut file = archive.by_name(name)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

fn xml_error(part: &str, err: impl std::fmt::Display) -> LoadError {
    LoadError::Xml {
        part: part.to_string(),
        message: err.to_string(),
    }
}
