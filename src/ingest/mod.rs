//! Ticket ingestion sources.
//!
//! Defines the `TicketSource` trait and provides the CSV export
//! implementation. A source hands back raw records exactly as the vendor
//! emitted them; all cleanup and canonicalization happens downstream in
//! the normalizer.

pub mod csv;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::RawTicketRecord;

/// Abstraction over purchase-record feeds.
///
/// Implementors fetch whatever tickets are currently visible to them; the
/// sync loop deduplicates by fingerprint, so returning the same ticket on
/// consecutive calls is expected and harmless.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Fetch all currently visible purchase records.
    async fn fetch_tickets(&self) -> Result<Vec<RawTicketRecord>>;

    /// Source name for logging and the canonical `source` field.
    fn name(&self) -> &str;
}
