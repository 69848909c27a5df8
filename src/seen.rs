// src/seen.rs
//! Durable record of NOTAM ids that were already delivered.
//!
//! The in-memory [`SeenSet`] is insertion ordered and FIFO-capped: once the
//! cap is exceeded the oldest ids are evicted. [`SeenStore`] persists it as
//! `{"seenNotams": [...]}` with a write-to-temp-then-rename save, and never
//! fails a load: a missing or corrupt file starts the relay cold.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::notice::Notice;

pub const DEFAULT_SEEN_CAP: usize = 1000;

#[derive(Debug, Clone)]
pub struct SeenSet {
    order: VecDeque<String>,
    index: HashSet<String>,
    cap: usize,
}

impl SeenSet {
    /// Empty set. A cap of 0 is treated as 1.
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            order: VecDeque::with_capacity(cap.min(4096)),
            index: HashSet::with_capacity(cap.min(4096)),
            cap,
        }
    }

    /// Rebuild from a persisted sequence: duplicates collapse onto their
    /// latest position, then the cap keeps the newest entries.
    pub fn from_ids<I, S>(ids: I, cap: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new(cap);
        for id in ids {
            let id = id.into();
            if set.index.contains(&id) {
                set.order.retain(|x| x != &id);
                set.order.push_back(id);
            } else {
                set.mark_seen(&id);
            }
        }
        set
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Idempotent insert. Returns `true` if `id` was not present before.
    pub fn mark_seen(&mut self, id: &str) -> bool {
        if self.index.contains(id) {
            return false;
        }
        self.order.push_back(id.to_string());
        self.index.insert(id.to_string());
        while self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.index.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.index.clear();
    }

    /// Ids oldest first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn to_record(&self) -> SeenRecord {
        SeenRecord {
            seen_notams: self.order.iter().cloned().collect(),
        }
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_CAP)
    }
}

/// On-disk shape of the seen-set.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenRecord {
    #[serde(rename = "seenNotams", default)]
    seen_notams: Vec<String>,
}

/// Notices whose id is not in `seen`, in input order.
pub fn diff_new(notices: &[Notice], seen: &SeenSet) -> Vec<Notice> {
    notices
        .iter()
        .filter(|n| !seen.contains(&n.id))
        .cloned()
        .collect()
}

#[derive(Debug, Clone)]
pub struct SeenStore {
    path: PathBuf,
    cap: usize,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: path.into(),
            cap,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted set. Missing file, unreadable file or bad JSON all
    /// yield an empty set.
    pub async fn load(&self) -> SeenSet {
        let bytes = match fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no seen-set on disk, starting cold");
                return SeenSet::new(self.cap);
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "seen-set unreadable, starting cold");
                return SeenSet::new(self.cap);
            }
        };

        match serde_json::from_slice::<SeenRecord>(&bytes) {
            Ok(rec) => {
                let set = SeenSet::from_ids(rec.seen_notams, self.cap);
                tracing::info!(path = %self.path.display(), count = set.len(), "seen-set loaded");
                set
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "seen-set corrupt, starting cold");
                SeenSet::new(self.cap)
            }
        }
    }

    /// Persist `set`, logging instead of returning failures.
    pub async fn save(&self, set: &SeenSet) {
        if let Err(e) = self.try_save(set).await {
            tracing::warn!(path = %self.path.display(), error = format!("{e:#}"), "seen-set save failed");
        }
    }

    /// Write to `<path>.tmp`, then rename over the target.
    pub async fn try_save(&self, set: &SeenSet) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let bytes = serde_json::to_vec_pretty(&set.to_record()).context("serializing seen-set")?;
        let tmp = tmp_path(&self.path);

        let mut file = fs::File::create(&tmp)
            .await
            .with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(&bytes).await.context("writing seen-set")?;
        file.sync_all().await.context("syncing seen-set")?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming {} into place", tmp.display()))?;
        tracing::debug!(path = %self.path.display(), count = set.len(), "seen-set saved");
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".tmp");
    PathBuf::from(s)
}
