//! JRA CSV-export ticket source.
//!
//! Parses the purchase-history CSV a member downloads from the wagering
//! portal. The export has preamble rows before the real header (located by
//! its first column being 日付), trailing 合計 summary rows, and packs the
//! bet type, buy method, and multi flag into a single 式別 cell. Horse
//! selections in 馬／組番 use ； within a group and ／ between groups.
//!
//! Files are expected re-encoded to UTF-8; the raw download is Shift_JIS.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::TicketSource;
use crate::types::RawTicketRecord;

pub const SOURCE_NAME: &str = "CSV_EXPORT";

const COL_DATE: &str = "日付";
const COL_PLACE: &str = "場名";
const COL_RACE: &str = "レース";
const COL_BET_KIND: &str = "式別";
const COL_HORSES: &str = "馬／組番";
const COL_AMOUNT: &str = "購入金額";
const COL_PAYOUT: &str = "払戻金額";
const COL_HIT: &str = "的中／返還";

/// Reads every `*.csv` under a directory and yields its rows as raw records.
pub struct CsvExportSource {
    dir: PathBuf,
}

impl CsvExportSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl TicketSource for CsvExportSource {
    async fn fetch_tickets(&self) -> Result<Vec<RawTicketRecord>> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read CSV export dir {}", self.dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let receipt_no = receipt_tag(&path);
            let parsed = parse_export(&content, &receipt_no);
            debug!(file = %path.display(), rows = parsed.len(), "Parsed CSV export");
            records.extend(parsed);
        }
        Ok(records)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

/// Receipt identifier for rows of one export file. The export itself
/// carries no receipt numbers, so the file stem stands in; the same file
/// re-downloaded keeps the same fingerprints.
fn receipt_tag(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("export")
        .to_string()
}

/// Parse one export's text into raw records. Unparseable rows are skipped
/// with a warning; one bad row never discards the file.
pub fn parse_export(content: &str, receipt_no: &str) -> Vec<RawTicketRecord> {
    let rows: Vec<Vec<String>> = content.lines().map(split_csv_line).collect();

    let Some(header_idx) = rows
        .iter()
        .position(|r| r.first().map(|c| c.trim()) == Some(COL_DATE))
    else {
        warn!(receipt_no, "CSV header row not found");
        return Vec::new();
    };

    let header: Vec<String> = rows[header_idx].iter().map(|h| h.trim().to_string()).collect();
    let col = |name: &str| header.iter().position(|h| h == name);

    let (Some(c_date), Some(c_place), Some(c_race), Some(c_kind), Some(c_horses), Some(c_amount)) = (
        col(COL_DATE),
        col(COL_PLACE),
        col(COL_RACE),
        col(COL_BET_KIND),
        col(COL_HORSES),
        col(COL_AMOUNT),
    ) else {
        warn!(receipt_no, "CSV header missing required columns");
        return Vec::new();
    };
    let c_payout = col(COL_PAYOUT);
    let c_hit = col(COL_HIT);

    let mut records = Vec::new();
    for (i, row) in rows[header_idx + 1..].iter().enumerate() {
        if row.len() < header.len() || row.iter().any(|cell| cell.contains("合計")) {
            continue;
        }

        let kind = row[c_kind].trim();
        let horses = row[c_horses].trim();
        let line_no = (i + 1).to_string();

        let (amount_per_point, total_cost) = split_amount(row[c_amount].trim());
        let payout = c_payout
            .map(|c| row[c].replace(',', "").trim().to_string())
            .unwrap_or_default();
        // A blank hit cell is no hint, not a loss; the settlement engine
        // stays authoritative for undecided races.
        let status = match c_hit {
            Some(c) if row[c].contains("的中") => "WIN".to_string(),
            _ => String::new(),
        };

        let mut record = RawTicketRecord {
            receipt_no: receipt_no.to_string(),
            line_no,
            race_date_str: row[c_date].trim().to_string(),
            race_place: row[c_place].trim().to_string(),
            race_number_str: row[c_race].trim().to_string(),
            bet_type: kind.to_string(),
            buy_method_text: kind.to_string(),
            multi: kind.contains("マルチ"),
            amount_per_point,
            total_cost,
            payout,
            status,
            source: SOURCE_NAME.to_string(),
            mode: "REAL".to_string(),
            ..Default::default()
        };

        if let Err(detail) = fill_selections(&mut record, kind, horses) {
            warn!(receipt_no, row = i + 1, detail, "Skipping unparseable CSV row");
            continue;
        }
        records.push(record);
    }
    records
}

/// Route the 馬／組番 cell into the right raw fields for the buy method
/// named in the 式別 cell.
fn fill_selections(record: &mut RawTicketRecord, kind: &str, horses: &str) -> Result<(), &'static str> {
    if kind.contains("ＢＯＸ") || kind.contains("ボックス") || kind.contains("BOX") {
        record.selections = vec![split_group(horses)];
    } else if kind.contains("フォーメーション") {
        record.selections = horses.split('／').map(split_group).collect();
    } else if kind.contains("ながし") || kind.contains("流し") {
        let parts: Vec<&str> = horses.split('／').collect();
        if parts.len() < 2 {
            return Err("nagashi cell lacks axis／partners split");
        }
        record.axis = split_group(parts[0]);
        record.partners = split_group(parts[1]);
        record.positions = claimed_positions(kind);
    } else {
        // Normal: "03-08", "8", "03→08→11" and similar.
        let nums: Vec<String> = horses
            .split(|c: char| !c.is_ascii_digit() && !('０'..='９').contains(&c))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if nums.is_empty() {
            return Err("no horse numbers in cell");
        }
        record.selections = vec![nums];
    }
    Ok(())
}

fn split_group(cell: &str) -> Vec<String> {
    cell.split('；')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `"100／300"` is per-point stake ／ total cost; a single value is both.
fn split_amount(cell: &str) -> (String, String) {
    match cell.split_once('／') {
        Some((per, total)) => (per.trim().to_string(), total.trim().to_string()),
        None => (cell.to_string(), cell.to_string()),
    }
}

/// Fixed finish positions claimed in the 式別 text, e.g. `１着ながし` → [1].
/// 頭目 marks bracket positions the same way.
fn claimed_positions(kind: &str) -> Vec<String> {
    let mut out = Vec::new();
    let chars: Vec<char> = kind.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c != '着' && !(c == '頭' && chars.get(i + 1) == Some(&'目')) {
            continue;
        }
        let mut digits = String::new();
        for &p in chars[..i].iter().rev() {
            if p.is_ascii_digit() {
                digits.insert(0, p);
            } else if ('０'..='９').contains(&p) {
                let folded = char::from_u32(p as u32 - '０' as u32 + '0' as u32).unwrap_or('0');
                digits.insert(0, folded);
            } else {
                break;
            }
        }
        if !digits.is_empty() {
            out.push(digits);
        }
    }
    out
}

/// Minimal CSV field splitter: comma delimited with double-quote escaping,
/// which is all the export uses.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
