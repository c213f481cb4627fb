//! File-drop result feed.
//!
//! Reads `<results_dir>/<race_id>.json`, one `OfficialResult` per file.
//! An upstream scraper (or a human, during backfills) drops files into the
//! directory; a missing file means the race is not yet decided.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::ResultFeed;
use crate::types::OfficialResult;

pub const FEED_NAME: &str = "FILE_DROP";

pub struct FileResultFeed {
    dir: PathBuf,
}

impl FileResultFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, race_id: &str) -> PathBuf {
        // Race ids are digit strings; anything else never matches a file
        // and must not escape the directory.
        let safe: String = race_id.chars().filter(|c| c.is_ascii_digit()).collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl ResultFeed for FileResultFeed {
    async fn fetch_result(&self, race_id: &str) -> Result<Option<OfficialResult>> {
        let path = self.path_for(race_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let result = parse_result(&content, &path)?;
                debug!(race_id, file = %path.display(), "Loaded official result");
                Ok(Some(result))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn name(&self) -> &str {
        FEED_NAME
    }
}

fn parse_result(content: &str, path: &Path) -> Result<OfficialResult> {
    serde_json::from_str(content)
        .with_context(|| format!("Malformed result file {}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
