//! Seen-article tracker.
//!
//! Keeps the identifiers (canonical URLs) of articles that were already
//! notified so repeated polling cycles do not alert twice. The state is
//! persisted as a flat JSON array of strings, oldest entry first.
//!
//! # Retention
//!
//! The tracker is capacity-bounded: once more than `capacity` identifiers have
//! been added, the oldest ones are evicted. Loading a file larger than the
//! capacity keeps only its newest entries. `None` disables eviction.
//!
//! # Failure semantics
//!
//! A missing, unreadable or corrupt file loads as an empty tracker. This can
//! re-notify articles after corruption, which is preferred over refusing to
//! start.

use std::collections::{HashSet, VecDeque};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Default number of identifiers kept on disk.
pub const DEFAULT_CAPACITY: usize = 50_000;

#[derive(Debug, Clone, Default)]
pub struct SeenTracker {
    order: VecDeque<String>,
    index: HashSet<String>,
    capacity: Option<usize>,
}

impl SeenTracker {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            order: VecDeque::new(),
            index: HashSet::new(),
            capacity,
        }
    }

    /// Build a tracker from identifiers ordered oldest first.
    pub fn from_ids<I>(ids: I, capacity: Option<usize>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut tracker = Self::new(capacity);
        for id in ids {
            tracker.add(id);
        }
        tracker
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Record `id` as seen. Returns `false` if it was already known.
    ///
    /// Nothing is written to disk until [`SeenTracker::save`].
    pub fn add(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if !self.index.insert(id.clone()) {
            return false;
        }
        self.order.push_back(id);
        self.evict();
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Identifiers, oldest first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn evict(&mut self) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
                debug!(id = %oldest, "Evicted seen article");
            }
        }
    }

    /// Load a tracker from `path`, falling back to an empty one.
    ///
    /// # Arguments
    ///
    /// * `path` - JSON array of article identifiers, oldest first
    /// * `capacity` - Most identifiers to keep; `None` keeps all
    ///
    /// # Returns
    ///
    /// The stored identifiers, trimmed to `capacity` by dropping the oldest. A
    /// missing, unreadable or malformed file yields an empty tracker and a
    /// logged warning, so a bad file never stops the watch loop.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let mut seen = SeenTracker::load(Path::new("sent_articles.json"), Some(50_000)).await;
    /// if !seen.contains(&id) { /* classify and alert */ }
    /// ```
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path, capacity: Option<usize>) -> Self {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No seen-article file yet; starting empty");
                return Self::new(capacity);
            }
            Err(e) => {
                warn!(error = %e, "Could not read seen-article file; starting empty");
                return Self::new(capacity);
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => {
                let total = ids.len();
                let tracker = Self::from_ids(ids, capacity);
                info!(loaded = total, kept = tracker.len(), "Loaded seen articles");
                tracker
            }
            Err(e) => {
                warn!(error = %e, "Seen-article file is corrupt; starting empty");
                Self::new(capacity)
            }
        }
    }

    /// Write the full set to `path`, replacing what was there.
    ///
    /// Identifiers are written oldest first, so a later [`load`](Self::load)
    /// keeps the same eviction order. Missing parent directories are created.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// seen.add(record.id.clone());
    /// seen.save(Path::new("sent_articles.json")).await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the file
    /// cannot be written.
    #[instrument(level = "info", skip_all, fields(path = %path.display(), count = self.len()))]
    pub async fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let ids: Vec<&str> = self.ids().collect();
        let json = serde_json::to_string(&ids)?;
        fs::write(path, json).await?;
        debug!("Saved seen articles");
        Ok(())
    }
}
