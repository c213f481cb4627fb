//! Shared types for the BAKEN settlement engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that ingest, engine, and storage
//! modules can depend on them without circular references.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Bet type
// ---------------------------------------------------------------------------

/// One of the 8 fixed JRA wager categories.
///
/// Each carries a fixed arity (how many horses make up one combination)
/// and orderedness (whether finishing order matters for a hit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetType {
    Win,
    Place,
    BracketQuinella,
    Quinella,
    QuinellaPlace,
    Exacta,
    Trio,
    Trifecta,
}

impl BetType {
    /// All known bet types (useful for iteration).
    pub const ALL: &'static [BetType] = &[
        BetType::Win,
        BetType::Place,
        BetType::BracketQuinella,
        BetType::Quinella,
        BetType::QuinellaPlace,
        BetType::Exacta,
        BetType::Trio,
        BetType::Trifecta,
    ];

    /// The fixed English code used in storage and the official feed.
    pub fn code(&self) -> &'static str {
        match self {
            BetType::Win => "WIN",
            BetType::Place => "PLACE",
            BetType::BracketQuinella => "BRACKET_QUINELLA",
            BetType::Quinella => "QUINELLA",
            BetType::QuinellaPlace => "QUINELLA_PLACE",
            BetType::Exacta => "EXACTA",
            BetType::Trio => "TRIO",
            BetType::Trifecta => "TRIFECTA",
        }
    }

    /// Number of horses in one concrete combination.
    pub fn arity(&self) -> usize {
        match self {
            BetType::Win | BetType::Place => 1,
            BetType::BracketQuinella
            | BetType::Quinella
            | BetType::QuinellaPlace
            | BetType::Exacta => 2,
            BetType::Trio | BetType::Trifecta => 3,
        }
    }

    /// Whether finishing order within a combination matters for a hit.
    pub fn is_ordered(&self) -> bool {
        matches!(self, BetType::Exacta | BetType::Trifecta)
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for BetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WIN" => Ok(BetType::Win),
            "PLACE" => Ok(BetType::Place),
            "BRACKET_QUINELLA" => Ok(BetType::BracketQuinella),
            "QUINELLA" => Ok(BetType::Quinella),
            "QUINELLA_PLACE" => Ok(BetType::QuinellaPlace),
            "EXACTA" => Ok(BetType::Exacta),
            "TRIO" => Ok(BetType::Trio),
            "TRIFECTA" => Ok(BetType::Trifecta),
            _ => Err(anyhow::anyhow!("Unknown bet type code: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Buy method
// ---------------------------------------------------------------------------

/// How a bet's horse selections are structured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuyMethod {
    Normal,
    Box,
    Formation,
    Nagashi,
}

impl fmt::Display for BuyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuyMethod::Normal => write!(f, "NORMAL"),
            BuyMethod::Box => write!(f, "BOX"),
            BuyMethod::Formation => write!(f, "FORMATION"),
            BuyMethod::Nagashi => write!(f, "NAGASHI"),
        }
    }
}

// ---------------------------------------------------------------------------
// Horse number
// ---------------------------------------------------------------------------

/// A horse number (1–18 on JRA cards, but any u8 is representable).
///
/// Serializes as a two-digit zero-padded string — the canonical content
/// representation — and deserializes from `"1"`, `"01"`, or a plain integer,
/// absorbing the formatting difference between the two ingestion paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HorseNo(pub u8);

impl HorseNo {
    /// Parse a raw token. Returns None for non-numeric garbage.
    pub fn parse(token: &str) -> Option<Self> {
        token.trim().parse::<u8>().ok().map(HorseNo)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for HorseNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl Serialize for HorseNo {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:02}", self.0))
    }
}

impl<'de> Deserialize<'de> for HorseNo {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NoVisitor;

        impl serde::de::Visitor<'_> for NoVisitor {
            type Value = HorseNo;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a horse number as a string or integer")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<HorseNo, E> {
                HorseNo::parse(v)
                    .ok_or_else(|| E::custom(format!("invalid horse number: {v:?}")))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<HorseNo, E> {
                u8::try_from(v)
                    .map(HorseNo)
                    .map_err(|_| E::custom(format!("horse number out of range: {v}")))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<HorseNo, E> {
                u8::try_from(v)
                    .map(HorseNo)
                    .map_err(|_| E::custom(format!("horse number out of range: {v}")))
            }
        }

        deserializer.deserialize_any(NoVisitor)
    }
}

// ---------------------------------------------------------------------------
// Bet content
// ---------------------------------------------------------------------------

/// The horse selections of a bet, tagged by buy method.
///
/// Fields that only apply to some methods (e.g. `positions`) simply do not
/// exist on the other variants, so invalid combinations are unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum BetContent {
    /// Explicit concrete combinations, one per inner list.
    #[serde(rename = "NORMAL")]
    Normal { selections: Vec<Vec<HorseNo>> },
    /// A single pool; every size-r draw from it is covered.
    #[serde(rename = "BOX")]
    Box { pool: Vec<HorseNo> },
    /// One candidate group per finishing slot, in slot order.
    #[serde(rename = "FORMATION")]
    Formation { groups: Vec<Vec<HorseNo>> },
    /// Axis horse(s) in every combination, partners filling the rest.
    ///
    /// `positions` is a parallel array to `axis`: each axis horse's claimed
    /// 1-based finishing slot. Empty means no fixed slots. Never populated
    /// together with `multi`.
    #[serde(rename = "NAGASHI")]
    Nagashi {
        axis: Vec<HorseNo>,
        partners: Vec<HorseNo>,
        positions: Vec<u8>,
        multi: bool,
    },
}

impl BetContent {
    /// Validated NAGASHI constructor.
    ///
    /// Rejects `positions` together with `multi` (multi means finishing order
    /// among the selected horses is unconstrained) and a `positions` list that
    /// is not parallel to `axis`.
    pub fn nagashi(
        axis: Vec<HorseNo>,
        partners: Vec<HorseNo>,
        positions: Vec<u8>,
        multi: bool,
    ) -> Result<Self, TicketError> {
        if multi && !positions.is_empty() {
            return Err(TicketError::InvalidContent(
                "positions cannot be fixed on a multi nagashi".to_string(),
            ));
        }
        if !positions.is_empty() && positions.len() != axis.len() {
            return Err(TicketError::InvalidContent(format!(
                "positions ({}) not parallel to axis ({})",
                positions.len(),
                axis.len()
            )));
        }
        Ok(BetContent::Nagashi { axis, partners, positions, multi })
    }

    /// The buy method this content belongs to.
    pub fn buy_method(&self) -> BuyMethod {
        match self {
            BetContent::Normal { .. } => BuyMethod::Normal,
            BetContent::Box { .. } => BuyMethod::Box,
            BetContent::Formation { .. } => BuyMethod::Formation,
            BetContent::Nagashi { .. } => BuyMethod::Nagashi,
        }
    }

    /// Canonical serialization with object keys sorted.
    ///
    /// serde_json maps are BTreeMap-backed, so converting to a Value first
    /// gives a stable key order regardless of field declaration order. This
    /// is the string that feeds the fingerprint.
    pub fn canonical_json(&self) -> String {
        serde_json::to_value(self)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Raw record & canonical bet
// ---------------------------------------------------------------------------

/// A ticket as scraped, before normalization.
///
/// Everything arrives as loosely-formatted text: full-width digits, padded or
/// unpadded horse numbers, Japanese bet-type names or pre-mapped codes —
/// depending on which ingestion path produced the record. Immutable once
/// produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTicketRecord {
    pub receipt_no: String,
    /// Per-receipt sequence number; an integer on one path, a zero-padded
    /// numeral string on the other.
    pub line_no: String,
    pub race_date_str: String,
    /// Japanese course name (e.g. 東京).
    pub race_place: String,
    pub race_number_str: String,
    /// Japanese bet-type name or a pre-mapped English code.
    pub bet_type: String,
    /// Buy-method indicator text (e.g. ながし, ボックス).
    pub buy_method_text: String,
    pub multi: bool,
    pub axis: Vec<String>,
    pub partners: Vec<String>,
    pub positions: Vec<String>,
    pub selections: Vec<Vec<String>>,
    pub amount_per_point: String,
    pub total_points: String,
    pub total_cost: String,
    /// Payout hint from sources that already know outcomes (past CSV export).
    pub payout: String,
    /// Status hint (WIN / LOSE); empty means not yet settled.
    pub status: String,
    pub source: String,
    pub mode: String,
}

/// Ticket lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Pending,
    Win,
    Lose,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketStatus::Pending => write!(f, "PENDING"),
            TicketStatus::Win => write!(f, "WIN"),
            TicketStatus::Lose => write!(f, "LOSE"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TicketStatus::Pending),
            "WIN" => Ok(TicketStatus::Win),
            "LOSE" => Ok(TicketStatus::Lose),
            _ => Err(anyhow::anyhow!("Unknown ticket status: {s}")),
        }
    }
}

/// A normalized, deduplicatable bet — the unit that is persisted and settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalBet {
    /// 8-digit date ∥ 2-digit course code ∥ 2-digit race number.
    pub race_id: String,
    /// None when the raw bet-type text could not be mapped; such tickets
    /// settle as LOSE once results exist rather than blocking the batch.
    pub bet_type: Option<BetType>,
    pub buy_method: BuyMethod,
    pub content: BetContent,
    /// Stake per point, in whole yen.
    pub amount_per_point: i64,
    pub total_points: i64,
    pub total_cost: i64,
    /// Set when amount_per_point × total_points ≠ total_cost with all three
    /// non-zero. Neither field is authoritative, so the conflict is flagged
    /// rather than resolved.
    pub cost_mismatch: bool,
    pub payout: i64,
    pub status: TicketStatus,
    pub source: String,
    pub mode: String,
    /// Deterministic content hash; the idempotency/uniqueness key.
    pub fingerprint: String,
}

impl fmt::Display for CanonicalBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} ¥{}×{} ({})",
            self.race_id,
            self.bet_type.map(|b| b.code()).unwrap_or("UNKNOWN"),
            self.buy_method,
            self.amount_per_point,
            self.total_points,
            self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Official result & settlement outcome
// ---------------------------------------------------------------------------

/// One winning combination with its payout, as declared officially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutEntry {
    /// Winning horse numbers in their officially declared order.
    pub horses: Vec<u8>,
    /// Payout in yen per 100 yen staked.
    pub payout_per_100: i64,
}

/// The official outcome of one race, as far as the feed knows it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfficialResult {
    pub race_id: String,
    /// Finishing order, 1st/2nd/3rd at minimum once finalized.
    pub finishers: Vec<u8>,
    /// Payout entries keyed by bet-type code. Bet types the feed does not
    /// report are simply absent.
    #[serde(default)]
    pub payouts: HashMap<BetType, Vec<PayoutEntry>>,
}

impl OfficialResult {
    /// Whether the feed has enough of this race to settle against.
    pub fn is_finalized(&self) -> bool {
        self.finishers.len() >= 3
    }

    /// Payout entries for a bet type; empty slice when unreported.
    pub fn entries_for(&self, bet_type: BetType) -> &[PayoutEntry] {
        self.payouts.get(&bet_type).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The terminal decision for one ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub race_id: String,
    pub fingerprint: String,
    pub status: TicketStatus,
    pub payout: i64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for BAKEN.
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("Invalid bet content: {0}")]
    InvalidContent(String),

    #[error("Cannot expand {bet_type} via {method}: {detail}")]
    Unexpandable {
        bet_type: String,
        method: String,
        detail: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- BetType tests --

    #[test]
    fn test_bet_type_codes_roundtrip() {
        for bt in BetType::ALL {
            let parsed: BetType = bt.code().parse().unwrap();
            assert_eq!(parsed, *bt);
        }
        assert!("TAN".parse::<BetType>().is_err());
    }

    #[test]
    fn test_bet_type_arity() {
        assert_eq!(BetType::Win.arity(), 1);
        assert_eq!(BetType::Place.arity(), 1);
        assert_eq!(BetType::BracketQuinella.arity(), 2);
        assert_eq!(BetType::Quinella.arity(), 2);
        assert_eq!(BetType::QuinellaPlace.arity(), 2);
        assert_eq!(BetType::Exacta.arity(), 2);
        assert_eq!(BetType::Trio.arity(), 3);
        assert_eq!(BetType::Trifecta.arity(), 3);
    }

    #[test]
    fn test_bet_type_orderedness() {
        assert!(BetType::Exacta.is_ordered());
        assert!(BetType::Trifecta.is_ordered());
        assert!(!BetType::Quinella.is_ordered());
        assert!(!BetType::Trio.is_ordered());
        assert!(!BetType::Win.is_ordered());
    }

    #[test]
    fn test_bet_type_serde_uses_codes() {
        let json = serde_json::to_string(&BetType::BracketQuinella).unwrap();
        assert_eq!(json, "\"BRACKET_QUINELLA\"");
        let back: BetType = serde_json::from_str("\"QUINELLA_PLACE\"").unwrap();
        assert_eq!(back, BetType::QuinellaPlace);
    }

    // -- HorseNo tests --

    #[test]
    fn test_horse_no_parse() {
        assert_eq!(HorseNo::parse("5"), Some(HorseNo(5)));
        assert_eq!(HorseNo::parse("05"), Some(HorseNo(5)));
        assert_eq!(HorseNo::parse(" 12 "), Some(HorseNo(12)));
        assert_eq!(HorseNo::parse("abc"), None);
    }

    #[test]
    fn test_horse_no_serializes_zero_padded() {
        let json = serde_json::to_string(&HorseNo(5)).unwrap();
        assert_eq!(json, "\"05\"");
        assert_eq!(HorseNo(12).to_string(), "12");
    }

    #[test]
    fn test_horse_no_deserializes_both_shapes() {
        let from_padded: HorseNo = serde_json::from_str("\"05\"").unwrap();
        let from_bare: HorseNo = serde_json::from_str("\"5\"").unwrap();
        let from_int: HorseNo = serde_json::from_str("5").unwrap();
        assert_eq!(from_padded, from_bare);
        assert_eq!(from_bare, from_int);
    }

    // -- BetContent tests --

    #[test]
    fn test_content_method_tag() {
        let content = BetContent::Box { pool: vec![HorseNo(1), HorseNo(2)] };
        let json = serde_json::to_string(&content).unwrap();
        assert!(json.contains("\"method\":\"BOX\""));
        assert_eq!(content.buy_method(), BuyMethod::Box);
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let content = BetContent::Nagashi {
            axis: vec![HorseNo(5)],
            partners: vec![HorseNo(3), HorseNo(8)],
            positions: vec![],
            multi: false,
        };
        let canon = content.canonical_json();
        // BTreeMap order: axis < method < multi < partners < positions
        let axis_at = canon.find("\"axis\"").unwrap();
        let method_at = canon.find("\"method\"").unwrap();
        let partners_at = canon.find("\"partners\"").unwrap();
        assert!(axis_at < method_at);
        assert!(method_at < partners_at);
    }

    #[test]
    fn test_canonical_json_deterministic() {
        let make = || BetContent::Formation {
            groups: vec![vec![HorseNo(1)], vec![HorseNo(2), HorseNo(3)]],
        };
        assert_eq!(make().canonical_json(), make().canonical_json());
    }

    #[test]
    fn test_nagashi_rejects_positions_with_multi() {
        let result = BetContent::nagashi(
            vec![HorseNo(5)],
            vec![HorseNo(3)],
            vec![1],
            true,
        );
        assert!(matches!(result, Err(TicketError::InvalidContent(_))));
    }

    #[test]
    fn test_nagashi_rejects_unparallel_positions() {
        let result = BetContent::nagashi(
            vec![HorseNo(5), HorseNo(6)],
            vec![HorseNo(3)],
            vec![1],
            false,
        );
        assert!(matches!(result, Err(TicketError::InvalidContent(_))));
    }

    #[test]
    fn test_nagashi_accepts_valid_shapes() {
        assert!(BetContent::nagashi(vec![HorseNo(5)], vec![HorseNo(3)], vec![1], false).is_ok());
        assert!(BetContent::nagashi(vec![HorseNo(5)], vec![HorseNo(3)], vec![], true).is_ok());
        assert!(BetContent::nagashi(vec![HorseNo(5)], vec![HorseNo(3)], vec![], false).is_ok());
    }

    // -- Status & result tests --

    #[test]
    fn test_status_display_roundtrip() {
        for s in [TicketStatus::Pending, TicketStatus::Win, TicketStatus::Lose] {
            let parsed: TicketStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn test_official_result_finalized() {
        let mut result = OfficialResult {
            race_id: "202401010501".to_string(),
            finishers: vec![5, 3],
            payouts: HashMap::new(),
        };
        assert!(!result.is_finalized());
        result.finishers.push(8);
        assert!(result.is_finalized());
    }

    #[test]
    fn test_entries_for_missing_bet_type_is_empty() {
        let result = OfficialResult::default();
        assert!(result.entries_for(BetType::BracketQuinella).is_empty());
    }

    #[test]
    fn test_payout_table_json_keys_are_codes() {
        let mut result = OfficialResult {
            race_id: "r".to_string(),
            finishers: vec![1, 2, 3],
            payouts: HashMap::new(),
        };
        result.payouts.insert(
            BetType::Win,
            vec![PayoutEntry { horses: vec![1], payout_per_100: 250 }],
        );
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"WIN\""));
        let back: OfficialResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entries_for(BetType::Win).len(), 1);
    }
}
