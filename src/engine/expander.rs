//! Combination Expander — a bet's declared method → the concrete
//! horse-number combinations it covers.
//!
//! Expansion is pure combinatorics over the canonical content: BOX draws
//! every size-r permutation or combination from the pool, FORMATION takes
//! the Cartesian product across slot groups, NAGASHI fills the non-axis
//! slots from the partner list. Fixed-position non-multi NAGASHI is the one
//! shape deliberately not expanded: the settler judges it directly as a
//! positional constraint check, which stays cheap for large partner pools.

use crate::types::{BetContent, BetType, TicketError};

/// Expand a bet into the combinations it would win on.
///
/// Each combination is a list of plain horse numbers; for order-sensitive
/// bet types the list order is the claimed finishing order. Shapes that
/// cannot be expanded return an error the settler maps to LOSE.
pub fn expand(bet_type: BetType, content: &BetContent) -> Result<Vec<Vec<u8>>, TicketError> {
    let r = bet_type.arity();

    match content {
        BetContent::Normal { selections } => {
            Ok(selections.iter().map(|g| to_numbers(g)).collect())
        }

        BetContent::Box { pool } => {
            let pool = to_numbers(pool);
            if bet_type.is_ordered() {
                Ok(permutations(&pool, r))
            } else {
                Ok(combinations(&pool, r))
            }
        }

        BetContent::Formation { groups } => {
            if groups.len() != r {
                return Err(unexpandable(
                    bet_type,
                    content,
                    format!("formation needs {r} groups, got {}", groups.len()),
                ));
            }
            let groups: Vec<Vec<u8>> = groups.iter().map(|g| to_numbers(g)).collect();
            Ok(cartesian_product(&groups))
        }

        BetContent::Nagashi { axis, partners, positions, multi } => {
            if !positions.is_empty() && !*multi {
                // Judged positionally by the settler, never enumerated.
                return Err(unexpandable(
                    bet_type,
                    content,
                    "fixed-position nagashi is judged positionally".to_string(),
                ));
            }
            let axis = to_numbers(axis);
            let partners = to_numbers(partners);
            let Some(needed) = r.checked_sub(axis.len()) else {
                return Err(unexpandable(
                    bet_type,
                    content,
                    format!("{} axis horses exceed arity {r}", axis.len()),
                ));
            };

            let mut combos = Vec::new();
            for chosen in combinations(&partners, needed) {
                let mut base = axis.clone();
                base.extend(&chosen);

                if *multi {
                    // Finishing order among the selected horses is
                    // unconstrained.
                    if bet_type.is_ordered() {
                        combos.extend(permutations(&base, r));
                    } else {
                        combos.push(base);
                    }
                } else if bet_type == BetType::Exacta {
                    // Axis fixed in slot 1.
                    for p in &chosen {
                        let mut c = axis.clone();
                        c.push(*p);
                        combos.push(c);
                    }
                } else if bet_type == BetType::Trifecta {
                    // 1 axis horse: slot 1 fixed, partners range over every
                    // ordered pair. 2 axis horses: slots 1–2 fixed in given
                    // order, slot 3 ranges over partners.
                    for perm in permutations(&chosen, chosen.len()) {
                        let mut c = axis.clone();
                        c.extend(perm);
                        combos.push(c);
                    }
                } else {
                    combos.push(base);
                }
            }
            Ok(combos)
        }
    }
}

fn unexpandable(bet_type: BetType, content: &BetContent, detail: String) -> TicketError {
    TicketError::Unexpandable {
        bet_type: bet_type.code().to_string(),
        method: content.buy_method().to_string(),
        detail,
    }
}

fn to_numbers(horses: &[crate::types::HorseNo]) -> Vec<u8> {
    horses.iter().map(|h| h.value()).collect()
}

/// All size-r combinations of `pool`, in pool order.
pub fn combinations(pool: &[u8], r: usize) -> Vec<Vec<u8>> {
    if r > pool.len() {
        return Vec::new();
    }
    if r == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(r);
    pick(pool, r, 0, &mut current, &mut out);
    out
}

fn pick(pool: &[u8], r: usize, start: usize, current: &mut Vec<u8>, out: &mut Vec<Vec<u8>>) {
    if current.len() == r {
        out.push(current.clone());
        return;
    }
    for i in start..pool.len() {
        current.push(pool[i]);
        pick(pool, r, i + 1, current, out);
        current.pop();
    }
}

/// All size-r permutations of `pool`.
pub fn permutations(pool: &[u8], r: usize) -> Vec<Vec<u8>> {
    if r > pool.len() {
        return Vec::new();
    }
    if r == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(r);
    let mut used = vec![false; pool.len()];
    arrange(pool, r, &mut used, &mut current, &mut out);
    out
}

fn arrange(pool: &[u8], r: usize, used: &mut [bool], current: &mut Vec<u8>, out: &mut Vec<Vec<u8>>) {
    if current.len() == r {
        out.push(current.clone());
        return;
    }
    for i in 0..pool.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        current.push(pool[i]);
        arrange(pool, r, used, current, out);
        current.pop();
        used[i] = false;
    }
}

/// Cartesian product across groups, in group (slot) order.
fn cartesian_product(groups: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut out: Vec<Vec<u8>> = vec![Vec::new()];
    for group in groups {
        let mut next = Vec::with_capacity(out.len() * group.len());
        for prefix in &out {
            for &h in group {
                let mut tuple = prefix.clone();
                tuple.push(h);
                next.push(tuple);
            }
        }
        out = next;
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
