//! Official race-result feeds.
//!
//! Defines the `ResultFeed` trait and provides the file-drop
//! implementation. A feed answers "what is the official result for this
//! race id", and says nothing when the race has not finished or is simply
//! unknown to it.

pub mod file;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::OfficialResult;

/// Abstraction over official result providers.
///
/// `None` means no result is available yet; that is an ordinary answer,
/// not an error, and leaves affected tickets pending.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultFeed: Send + Sync {
    /// Fetch the official result for one race, if published.
    async fn fetch_result(&self, race_id: &str) -> Result<Option<OfficialResult>>;

    /// Feed name for logging.
    fn name(&self) -> &str;
}
