//! Settlement Engine — pure win/lose/payout decisions.
//!
//! `settle` is stateless and deterministic: identical inputs give identical
//! output on every call, so re-running it when new bets arrive for an
//! already-finalized race is safe. It never guesses — an absent or
//! incomplete official result leaves the ticket pending, while a shape the
//! expander cannot handle settles as LOSE and is logged as an anomaly
//! rather than halting the batch.

use tracing::{debug, warn};

use crate::engine::expander;
use crate::types::{
    BetContent, CanonicalBet, HorseNo, OfficialResult, PayoutEntry, SettlementOutcome,
    TicketStatus,
};

/// The settler's decision for one ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Result absent or not finalized; the ticket stays as it is.
    Pending,
    Settled { status: TicketStatus, payout: i64 },
}

impl Verdict {
    pub fn lose() -> Self {
        Verdict::Settled { status: TicketStatus::Lose, payout: 0 }
    }

    /// Convert to a persistable outcome; None while pending.
    pub fn into_outcome(self, bet: &CanonicalBet) -> Option<SettlementOutcome> {
        match self {
            Verdict::Pending => None,
            Verdict::Settled { status, payout } => Some(SettlementOutcome {
                race_id: bet.race_id.clone(),
                fingerprint: bet.fingerprint.clone(),
                status,
                payout,
            }),
        }
    }
}

/// Judge one ticket against the official result.
pub fn settle(bet: &CanonicalBet, result: Option<&OfficialResult>) -> Verdict {
    let Some(result) = result else {
        return Verdict::Pending;
    };
    if !result.is_finalized() {
        return Verdict::Pending;
    }

    let Some(bet_type) = bet.bet_type else {
        warn!(
            race_id = %bet.race_id,
            fingerprint = %bet.fingerprint,
            "Ticket with unmapped bet type settled as LOSE"
        );
        return Verdict::lose();
    };

    // Bet types the official feed does not report (e.g. bracket quinella on
    // some cards) settle as LOSE rather than staying pending forever.
    let entries = result.entries_for(bet_type);
    if entries.is_empty() {
        return Verdict::lose();
    }

    // Fixed-position non-multi nagashi is a constraint check, not a
    // membership test against an enumerated set.
    if let BetContent::Nagashi { axis, partners, positions, multi } = &bet.content {
        if !positions.is_empty() && !multi {
            return settle_positional(bet, axis, partners, positions, entries);
        }
    }

    let combos = match expander::expand(bet_type, &bet.content) {
        Ok(combos) => combos,
        Err(e) => {
            warn!(
                race_id = %bet.race_id,
                fingerprint = %bet.fingerprint,
                error = %e,
                "Unexpandable ticket settled as LOSE"
            );
            return Verdict::lose();
        }
    };

    let ordered = bet_type.is_ordered();
    let mut payout = 0i64;
    let mut hits = 0u32;

    // Official results can list multiple equal-rank winning combinations
    // (dead heats), and a ticket may match more than one; every match pays.
    for entry in entries {
        let hit = combos.iter().any(|combo| {
            if ordered {
                combo == &entry.horses
            } else {
                sets_equal(combo, &entry.horses)
            }
        });
        if hit {
            payout += entry_payout(bet.amount_per_point, entry);
            hits += 1;
        }
    }

    if hits > 0 {
        debug!(
            race_id = %bet.race_id,
            fingerprint = %bet.fingerprint,
            hits,
            payout,
            "Ticket hit"
        );
        Verdict::Settled { status: TicketStatus::Win, payout }
    } else {
        Verdict::lose()
    }
}

/// Fixed-position nagashi path: each axis horse must occupy its claimed
/// slot, and every remaining official finisher must come from the partner
/// list. Checked against each payout entry so dead heats still accumulate.
fn settle_positional(
    bet: &CanonicalBet,
    axis: &[HorseNo],
    partners: &[HorseNo],
    positions: &[u8],
    entries: &[PayoutEntry],
) -> Verdict {
    let mut payout = 0i64;
    let mut hits = 0u32;

    for entry in entries {
        if positional_hit(axis, partners, positions, &entry.horses) {
            payout += entry_payout(bet.amount_per_point, entry);
            hits += 1;
        }
    }

    if hits > 0 {
        Verdict::Settled { status: TicketStatus::Win, payout }
    } else {
        Verdict::lose()
    }
}

fn positional_hit(
    axis: &[HorseNo],
    partners: &[HorseNo],
    positions: &[u8],
    winning: &[u8],
) -> bool {
    if positions.is_empty() || positions.len() != axis.len() {
        return false;
    }

    // Step A: every axis horse sits in its claimed slot.
    for (horse, &pos) in axis.iter().zip(positions) {
        let Some(idx) = (pos as usize).checked_sub(1) else {
            return false;
        };
        match winning.get(idx) {
            Some(&w) if w == horse.value() => {}
            _ => return false,
        }
    }

    // Step B: the unclaimed slots are all covered by partners.
    let claimed: Vec<usize> = positions.iter().map(|&p| p as usize - 1).collect();
    winning
        .iter()
        .enumerate()
        .filter(|(i, _)| !claimed.contains(i))
        .all(|(_, &w)| partners.iter().any(|p| p.value() == w))
}

/// Per-point stake × official payout per 100 staked, integer division.
fn entry_payout(amount_per_point: i64, entry: &PayoutEntry) -> i64 {
    amount_per_point * entry.payout_per_100 / 100
}

fn sets_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a2 = a.to_vec();
    let mut b2 = b.to_vec();
    a2.sort_unstable();
    b2.sort_unstable();
    a2 == b2
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
