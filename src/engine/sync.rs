//! Sync and settle orchestration.
//!
//! `Syncer` pulls raw tickets from every configured source, canonicalizes
//! them, and upserts into the store; then walks races with pending tickets,
//! fetches official results concurrently, and settles what it can. Both
//! passes are idempotent, so the daemon simply repeats them on a timer.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::engine::normalizer::Normalizer;
use crate::engine::settler::{self, Verdict};
use crate::ingest::TicketSource;
use crate::results::ResultFeed;
use crate::storage::TicketStore;
use crate::types::TicketStatus;

// ---------------------------------------------------------------------------
// Cycle reports
// ---------------------------------------------------------------------------

/// Result of one ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub fetched: usize,
    pub written: usize,
    /// Same fingerprint seen more than once within this batch.
    pub batch_duplicates: usize,
    /// Upserts refused because the stored row was already settled.
    pub blocked_settled: usize,
    pub source_errors: usize,
}

/// Result of one settlement pass.
#[derive(Debug, Clone, Default)]
pub struct SettleReport {
    pub races_checked: usize,
    pub races_resolved: usize,
    pub wins: usize,
    pub losses: usize,
    pub total_payout: i64,
    pub feed_errors: usize,
}

// ---------------------------------------------------------------------------
// Syncer
// ---------------------------------------------------------------------------

pub struct Syncer {
    sources: Vec<Arc<dyn TicketSource>>,
    feed: Arc<dyn ResultFeed>,
    store: TicketStore,
    normalizer: Normalizer,
}

impl Syncer {
    pub fn new(
        sources: Vec<Arc<dyn TicketSource>>,
        feed: Arc<dyn ResultFeed>,
        store: TicketStore,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            sources,
            feed,
            store,
            normalizer,
        }
    }

    /// Pull, canonicalize, and persist tickets from every source.
    ///
    /// A failing source is logged and skipped; the others still sync.
    pub async fn sync_tickets(&self) -> SyncReport {
        let mut report = SyncReport::default();
        let mut seen: HashSet<String> = HashSet::new();

        for source in &self.sources {
            let raws = match source.fetch_tickets().await {
                Ok(raws) => raws,
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Ticket source failed");
                    report.source_errors += 1;
                    continue;
                }
            };
            report.fetched += raws.len();

            for raw in &raws {
                let bet = self.normalizer.normalize(raw);

                // Sources can serve the same ticket twice in one pull
                // (overlapping exports); first occurrence wins.
                if !seen.insert(bet.fingerprint.clone()) {
                    report.batch_duplicates += 1;
                    continue;
                }

                match self.store.upsert_ticket(&bet).await {
                    Ok(true) => report.written += 1,
                    Ok(false) => report.blocked_settled += 1,
                    Err(e) => {
                        warn!(
                            fingerprint = %bet.fingerprint,
                            error = %e,
                            "Upsert failed"
                        );
                    }
                }
            }
        }

        info!(
            fetched = report.fetched,
            written = report.written,
            batch_duplicates = report.batch_duplicates,
            blocked_settled = report.blocked_settled,
            source_errors = report.source_errors,
            "Ticket sync complete"
        );
        report
    }

    /// Settle every pending ticket whose race now has an official result.
    pub async fn settle_pending(&self) -> SettleReport {
        let mut report = SettleReport::default();

        let race_ids = match self.store.pending_race_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Failed to list pending races");
                return report;
            }
        };
        report.races_checked = race_ids.len();
        if race_ids.is_empty() {
            return report;
        }

        let fetches = race_ids.iter().map(|race_id| {
            let feed = Arc::clone(&self.feed);
            async move { (race_id.clone(), feed.fetch_result(race_id).await) }
        });

        for (race_id, fetched) in join_all(fetches).await {
            let result = match fetched {
                Ok(Some(result)) => result,
                Ok(None) => {
                    debug!(race_id, "No official result yet");
                    continue;
                }
                Err(e) => {
                    warn!(race_id, error = %e, "Result feed failed");
                    report.feed_errors += 1;
                    continue;
                }
            };

            let bets = match self.store.pending_for_race(&race_id).await {
                Ok(bets) => bets,
                Err(e) => {
                    warn!(race_id, error = %e, "Failed to load pending tickets");
                    continue;
                }
            };

            let mut race_settled = false;
            for bet in &bets {
                let verdict = settler::settle(bet, Some(&result));
                let Some(outcome) = verdict.into_outcome(bet) else {
                    continue;
                };
                match outcome.status {
                    TicketStatus::Win => {
                        report.wins += 1;
                        report.total_payout += outcome.payout;
                    }
                    TicketStatus::Lose => report.losses += 1,
                    TicketStatus::Pending => {}
                }
                if let Err(e) = self.store.record_outcome(&outcome).await {
                    warn!(
                        fingerprint = %outcome.fingerprint,
                        error = %e,
                        "Failed to record outcome"
                    );
                    continue;
                }
                race_settled = true;
            }
            if race_settled {
                report.races_resolved += 1;
            }
        }

        info!(
            races_checked = report.races_checked,
            races_resolved = report.races_resolved,
            wins = report.wins,
            losses = report.losses,
            total_payout = report.total_payout,
            feed_errors = report.feed_errors,
            "Settlement pass complete"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
