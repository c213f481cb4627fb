//! Bet Record Normalizer — raw scraped record → canonical bet + fingerprint.
//!
//! The two ingestion paths hand over the same ticket in different shapes:
//! full-width vs half-width digits, `"01"` vs `1` line numbers, padded vs
//! bare horse numbers. Everything is folded into one canonical form here so
//! that the fingerprint is a pure function of meaning, and re-ingestion from
//! either path upserts onto the same row. Normalization never fails; any
//! unmappable input degrades to a safe default.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::LookupTables;
use crate::types::{
    BetContent, BetType, BuyMethod, CanonicalBet, HorseNo, RawTicketRecord, TicketStatus,
};

/// Fallback course code for names missing from the lookup table.
const UNKNOWN_COURSE: &str = "00";

pub struct Normalizer {
    tables: LookupTables,
}

impl Normalizer {
    pub fn new(tables: LookupTables) -> Self {
        Self { tables }
    }

    /// Produce a canonical bet from a raw record. Pure; never fails.
    pub fn normalize(&self, raw: &RawTicketRecord) -> CanonicalBet {
        let date = digits_only(&fold_digits(&raw.race_date_str));
        let course_code = self.course_code(&raw.race_place);
        let race_no = parse_int(&raw.race_number_str).unwrap_or(0);
        let race_id = format!("{date}{course_code}{race_no:02}");

        let receipt_no = fold_digits(&raw.receipt_no);
        // Reduced to its integer value so "01" and 1 compare equal across
        // the two ingestion paths.
        let line_no = parse_int(&raw.line_no).unwrap_or(0);

        let bet_type = self.map_bet_type(&raw.bet_type);
        let (buy_method, content) = self.build_content(raw, bet_type);

        let amount_per_point = parse_amount(&raw.amount_per_point);
        let total_cost = parse_amount(&raw.total_cost);
        let mut total_points = parse_amount(&raw.total_points);
        if total_points == 0 && amount_per_point > 0 {
            total_points = total_cost / amount_per_point;
        }
        let cost_mismatch = amount_per_point > 0
            && total_points > 0
            && total_cost > 0
            && amount_per_point * total_points != total_cost;
        if cost_mismatch {
            warn!(
                race_id = %race_id,
                amount_per_point,
                total_points,
                total_cost,
                "Cost fields disagree; keeping both and flagging"
            );
        }

        let canonical = content.canonical_json();
        let fingerprint = fingerprint(&date, &receipt_no, line_no, &canonical);

        let status = raw.status.parse().unwrap_or(TicketStatus::Pending);
        let payout = parse_amount(&raw.payout);

        CanonicalBet {
            race_id,
            bet_type,
            buy_method,
            content,
            amount_per_point,
            total_points,
            total_cost,
            cost_mismatch,
            payout,
            status,
            source: raw.source.clone(),
            mode: raw.mode.clone(),
            fingerprint,
        }
    }

    fn course_code(&self, place: &str) -> String {
        match self.tables.course_codes.get(place.trim()) {
            Some(code) => code.clone(),
            None => {
                if !place.trim().is_empty() {
                    warn!(place, "Unknown course name, falling back to 00");
                }
                UNKNOWN_COURSE.to_string()
            }
        }
    }

    /// Map raw bet-type text to its fixed code. Accepts an already-mapped
    /// English code, otherwise matches Japanese names by containment (the
    /// raw 式別 column embeds the buy method, e.g. ３連単ながしマルチ).
    fn map_bet_type(&self, text: &str) -> Option<BetType> {
        let trimmed = text.trim();
        if let Ok(bt) = trimmed.parse::<BetType>() {
            return Some(bt);
        }
        // The export prints a half-width 3 in some rows; the table keys the
        // full-width ３ the official vocabulary uses.
        let folded = trimmed.replace('3', "３");
        for (jp, code) in &self.tables.bet_types {
            if folded.contains(jp.as_str()) {
                return code.parse().ok();
            }
        }
        if !trimmed.is_empty() {
            warn!(text = trimmed, "Unmappable bet type");
        }
        None
    }

    /// Assemble the content variant, applying the canonical ordering rules.
    fn build_content(
        &self,
        raw: &RawTicketRecord,
        bet_type: Option<BetType>,
    ) -> (BuyMethod, BetContent) {
        let method = detect_buy_method(&raw.buy_method_text);

        match method {
            BuyMethod::Box => {
                let mut pool: Vec<HorseNo> =
                    raw.selections.iter().flatten().filter_map(|t| parse_horse(t)).collect();
                pool.sort();
                (method, BetContent::Box { pool })
            }
            BuyMethod::Formation => {
                // Group order encodes the finishing slot; only the inside of
                // each group is order-free.
                let groups = raw
                    .selections
                    .iter()
                    .map(|g| {
                        let mut horses: Vec<HorseNo> =
                            g.iter().filter_map(|t| parse_horse(t)).collect();
                        horses.sort();
                        horses
                    })
                    .collect();
                (method, BetContent::Formation { groups })
            }
            BuyMethod::Nagashi => {
                let mut axis: Vec<HorseNo> =
                    raw.axis.iter().filter_map(|t| parse_horse(t)).collect();
                let mut partners: Vec<HorseNo> =
                    raw.partners.iter().filter_map(|t| parse_horse(t)).collect();
                partners.sort();
                let positions: Vec<u8> = raw
                    .positions
                    .iter()
                    .filter_map(|t| parse_int(t).map(|n| n as u8))
                    .collect();
                // Axis order only matters when paired element-for-element
                // with fixed positions.
                if positions.is_empty() {
                    axis.sort();
                }
                let content = BetContent::nagashi(axis.clone(), partners.clone(), positions, raw.multi)
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "Invalid nagashi shape, dropping fixed positions");
                        axis.sort();
                        BetContent::Nagashi { axis, partners, positions: Vec::new(), multi: raw.multi }
                    });
                (method, content)
            }
            BuyMethod::Normal => {
                // For order-sensitive bet types the token order of an
                // explicit combination is its meaning; sorting is only safe
                // where set equality decides the hit.
                let keep_order = bet_type.map(|b| b.is_ordered()).unwrap_or(false);
                let selections = raw
                    .selections
                    .iter()
                    .map(|g| {
                        let mut horses: Vec<HorseNo> =
                            g.iter().filter_map(|t| parse_horse(t)).collect();
                        if !keep_order {
                            horses.sort();
                        }
                        horses
                    })
                    .collect();
                (method, BetContent::Normal { selections })
            }
        }
    }
}

/// Detect the buy method from raw indicator text.
pub fn detect_buy_method(text: &str) -> BuyMethod {
    if text.contains("ＢＯＸ") || text.contains("ボックス") || text.contains("BOX") {
        BuyMethod::Box
    } else if text.contains("フォーメーション") || text.contains("FORMATION") {
        BuyMethod::Formation
    } else if text.contains("ながし") || text.contains("流し") || text.contains("NAGASHI") {
        BuyMethod::Nagashi
    } else {
        BuyMethod::Normal
    }
}

/// Stable hash over date, receipt, line, and canonical content.
///
/// Date and receipt/line are included so the same horses bet on different
/// days, or distinct lines under one receipt, never collide.
fn fingerprint(date: &str, receipt_no: &str, line_no: i64, canonical_content: &str) -> String {
    let unique = format!("{date}-{receipt_no}-{line_no}-{canonical_content}");
    let digest = Sha256::digest(unique.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Convert full-width digits to half-width and trim surrounding whitespace
/// (including the full-width space the portal pads with).
fn fold_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            _ => c,
        })
        .collect::<String>()
        .trim_matches(|c: char| c.is_whitespace() || c == '　')
        .to_string()
}

fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Best-effort integer from loosely formatted text; None for garbage.
fn parse_int(s: &str) -> Option<i64> {
    let digits = digits_only(&fold_digits(s));
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Money field: commas, 円 suffixes, and full-width digits tolerated;
/// anything unparsable is 0 (the ticket is still produced).
fn parse_amount(s: &str) -> i64 {
    parse_int(s).unwrap_or(0)
}

fn parse_horse(token: &str) -> Option<HorseNo> {
    HorseNo::parse(&fold_digits(token))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LookupTables;

    fn normalizer() -> Normalizer {
        Normalizer::new(LookupTables::default())
    }

    fn base_raw() -> RawTicketRecord {
        RawTicketRecord {
            receipt_no: "001234".to_string(),
            line_no: "1".to_string(),
            race_date_str: "20240114".to_string(),
            race_place: "中山".to_string(),
            race_number_str: "11".to_string(),
            bet_type: "WIN".to_string(),
            buy_method_text: String::new(),
            selections: vec![vec!["1".to_string()]],
            amount_per_point: "100".to_string(),
            total_cost: "100".to_string(),
            source: "CSV_EXPORT".to_string(),
            mode: "REAL".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_race_id_derivation() {
        let bet = normalizer().normalize(&base_raw());
        assert_eq!(bet.race_id, "202401140611");
    }

    #[test]
    fn test_race_id_strips_date_separators() {
        let mut raw = base_raw();
        raw.race_date_str = "2024-01-14".to_string();
        let bet = normalizer().normalize(&raw);
        assert_eq!(bet.race_id, "202401140611");
    }

    #[test]
    fn test_unknown_course_falls_back_to_00() {
        let mut raw = base_raw();
        raw.race_place = "ドバイ".to_string();
        let bet = normalizer().normalize(&raw);
        assert_eq!(bet.race_id, "202401140011");
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = normalizer().normalize(&base_raw());
        let b = normalizer().normalize(&base_raw());
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_cross_source_equivalence() {
        // CSV shape: bare horse number, numeric line, half-width receipt.
        let csv = base_raw();

        // Portal shape: padded horse number, zero-padded line, full-width
        // receipt digits, pre-mapped course irrelevant to fingerprint.
        let mut portal = base_raw();
        portal.receipt_no = "００１２３４".to_string();
        portal.line_no = "01".to_string();
        portal.selections = vec![vec!["01".to_string()]];
        portal.source = "PORTAL".to_string();

        let a = normalizer().normalize(&csv);
        let b = normalizer().normalize(&portal);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_different_days_do_not_collide() {
        let a = normalizer().normalize(&base_raw());
        let mut other_day = base_raw();
        other_day.race_date_str = "20240121".to_string();
        let b = normalizer().normalize(&other_day);
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_different_lines_do_not_collide() {
        let a = normalizer().normalize(&base_raw());
        let mut other_line = base_raw();
        other_line.line_no = "2".to_string();
        let b = normalizer().normalize(&other_line);
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_bet_type_japanese_mapping() {
        let mut raw = base_raw();
        raw.bet_type = "３連単ながしマルチ".to_string();
        let bet = normalizer().normalize(&raw);
        assert_eq!(bet.bet_type, Some(BetType::Trifecta));
    }

    #[test]
    fn test_bet_type_half_width_three() {
        let mut raw = base_raw();
        raw.bet_type = "3連複ＢＯＸ".to_string();
        let bet = normalizer().normalize(&raw);
        assert_eq!(bet.bet_type, Some(BetType::Trio));
    }

    #[test]
    fn test_unmappable_bet_type_is_none() {
        let mut raw = base_raw();
        raw.bet_type = "重勝".to_string();
        let bet = normalizer().normalize(&raw);
        assert_eq!(bet.bet_type, None);
        assert_eq!(bet.status, TicketStatus::Pending);
    }

    #[test]
    fn test_partners_always_sorted() {
        let mut raw = base_raw();
        raw.bet_type = "３連単ながし".to_string();
        raw.buy_method_text = "ながし".to_string();
        raw.selections = Vec::new();
        raw.axis = vec!["5".to_string()];
        raw.partners = vec!["8".to_string(), "3".to_string(), "12".to_string()];
        let bet = normalizer().normalize(&raw);
        match bet.content {
            BetContent::Nagashi { partners, .. } => {
                assert_eq!(partners, vec![HorseNo(3), HorseNo(8), HorseNo(12)]);
            }
            other => panic!("expected nagashi, got {other:?}"),
        }
    }

    #[test]
    fn test_axis_sorted_only_without_positions() {
        let mut raw = base_raw();
        raw.bet_type = "３連単ながし".to_string();
        raw.buy_method_text = "ながし".to_string();
        raw.selections = Vec::new();
        raw.axis = vec!["7".to_string(), "2".to_string()];
        raw.partners = vec!["9".to_string()];

        // No positions: axis sorts.
        let bet = normalizer().normalize(&raw);
        match &bet.content {
            BetContent::Nagashi { axis, .. } => {
                assert_eq!(axis, &vec![HorseNo(2), HorseNo(7)]);
            }
            other => panic!("expected nagashi, got {other:?}"),
        }

        // Positions pair with axis element-for-element: order preserved.
        raw.positions = vec!["2".to_string(), "1".to_string()];
        let bet = normalizer().normalize(&raw);
        match &bet.content {
            BetContent::Nagashi { axis, positions, .. } => {
                assert_eq!(axis, &vec![HorseNo(7), HorseNo(2)]);
                assert_eq!(positions, &vec![2, 1]);
            }
            other => panic!("expected nagashi, got {other:?}"),
        }
    }

    #[test]
    fn test_multi_with_positions_degrades() {
        let mut raw = base_raw();
        raw.bet_type = "３連単ながしマルチ".to_string();
        raw.buy_method_text = "ながしマルチ".to_string();
        raw.multi = true;
        raw.selections = Vec::new();
        raw.axis = vec!["5".to_string()];
        raw.partners = vec!["3".to_string()];
        raw.positions = vec!["1".to_string()];
        let bet = normalizer().normalize(&raw);
        match bet.content {
            BetContent::Nagashi { positions, multi, .. } => {
                assert!(positions.is_empty());
                assert!(multi);
            }
            other => panic!("expected nagashi, got {other:?}"),
        }
    }

    #[test]
    fn test_normal_ordered_selection_preserves_order() {
        let mut raw = base_raw();
        raw.bet_type = "馬単".to_string();
        raw.selections = vec![vec!["8".to_string(), "3".to_string()]];
        let bet = normalizer().normalize(&raw);
        match bet.content {
            BetContent::Normal { selections } => {
                assert_eq!(selections, vec![vec![HorseNo(8), HorseNo(3)]]);
            }
            other => panic!("expected normal, got {other:?}"),
        }
    }

    #[test]
    fn test_normal_unordered_selection_sorts() {
        let mut raw = base_raw();
        raw.bet_type = "馬連".to_string();
        raw.selections = vec![vec!["8".to_string(), "3".to_string()]];
        let bet = normalizer().normalize(&raw);
        match bet.content {
            BetContent::Normal { selections } => {
                assert_eq!(selections, vec![vec![HorseNo(3), HorseNo(8)]]);
            }
            other => panic!("expected normal, got {other:?}"),
        }
    }

    #[test]
    fn test_garbled_amounts_default_to_zero() {
        let mut raw = base_raw();
        raw.amount_per_point = "?!".to_string();
        raw.total_cost = String::new();
        let bet = normalizer().normalize(&raw);
        assert_eq!(bet.amount_per_point, 0);
        assert_eq!(bet.total_cost, 0);
        assert_eq!(bet.total_points, 0);
        assert_eq!(bet.status, TicketStatus::Pending);
    }

    #[test]
    fn test_points_derived_from_cost() {
        let mut raw = base_raw();
        raw.bet_type = "３連複".to_string();
        raw.buy_method_text = "ボックス".to_string();
        raw.selections = vec![vec!["1".to_string(), "2".to_string(), "3".to_string(), "4".to_string()]];
        raw.amount_per_point = "100".to_string();
        raw.total_cost = "400".to_string();
        raw.total_points = String::new();
        let bet = normalizer().normalize(&raw);
        assert_eq!(bet.total_points, 4);
        assert!(!bet.cost_mismatch);
    }

    #[test]
    fn test_cost_mismatch_flagged_not_resolved() {
        let mut raw = base_raw();
        raw.amount_per_point = "100".to_string();
        raw.total_points = "3".to_string();
        raw.total_cost = "500".to_string();
        let bet = normalizer().normalize(&raw);
        assert!(bet.cost_mismatch);
        assert_eq!(bet.total_points, 3);
        assert_eq!(bet.total_cost, 500);
    }

    #[test]
    fn test_full_width_amounts_parse() {
        let mut raw = base_raw();
        raw.amount_per_point = "１００".to_string();
        raw.total_cost = "1,200円".to_string();
        let bet = normalizer().normalize(&raw);
        assert_eq!(bet.amount_per_point, 100);
        assert_eq!(bet.total_cost, 1200);
    }

    #[test]
    fn test_status_hint_carried() {
        let mut raw = base_raw();
        raw.status = "WIN".to_string();
        raw.payout = "250".to_string();
        let bet = normalizer().normalize(&raw);
        assert_eq!(bet.status, TicketStatus::Win);
        assert_eq!(bet.payout, 250);
    }
}
