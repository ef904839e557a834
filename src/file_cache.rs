use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::csv_ingest::ParsedFile;
use crate::error::CacheError;
use crate::store::KeyValueStore;
use crate::upload::Upload;

/// Store key under which the whole filename -> record mapping is kept.
pub const STORE_KEY: &str = "csv_files";

/// Cached metadata and parsed content for one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub size: u64,
    pub last_modified_at: DateTime<Utc>,
    pub uploaded_at: DateTime<Utc>,
    pub parsed: ParsedFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    Inserted,
    OverwriteConfirmed,
    OverwriteDeclined,
}

/// Retention policy. `max_files: None` keeps every file ever uploaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_files: Option<usize>,
}

/// Filename-keyed cache of parsed CSV files, written through to a [`KeyValueStore`].
pub struct FileCache {
    store: Box<dyn KeyValueStore>,
    records: BTreeMap<String, FileRecord>,
    policy: CachePolicy,
}

impl fmt::Debug for FileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCache")
            .field("records", &self.records.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

impl FileCache {
    /// Load the persisted mapping. Missing or corrupt state yields an empty cache.
    pub fn load(store: Box<dyn KeyValueStore>, policy: CachePolicy) -> Self {
        let records = match store.get(STORE_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<BTreeMap<String, FileRecord>>(&json) {
                Ok(records) => records,
                Err(e) => {
                    log::warn!("Ignoring unparsable cached files: {e}");
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                log::warn!("Could not read file cache, starting empty: {e}");
                BTreeMap::new()
            }
        };
        log::info!("Loaded {} cached file(s)", records.len());
        Self {
            store,
            records,
            policy,
        }
    }

    /// Insert `upload`, or replace an existing record with the same name if `confirm`
    /// approves it. `confirm` is only called when the name is already cached.
    ///
    /// The whole mapping is persisted on every change; if that write fails the cache
    /// is left as it was.
    pub fn put<F>(&mut self, upload: Upload, confirm: F) -> Result<PutStatus, CacheError>
    where
        F: FnOnce(&FileRecord) -> bool,
    {
        let now = Utc::now();
        let (status, uploaded_at) = match self.records.get(&upload.name) {
            Some(existing) => {
                if !confirm(existing) {
                    log::info!("Overwrite of {} declined", upload.name);
                    return Ok(PutStatus::OverwriteDeclined);
                }
                // uploaded_at must move forward even when the clock has not
                let floor = existing.uploaded_at + TimeDelta::milliseconds(1);
                (PutStatus::OverwriteConfirmed, now.max(floor))
            }
            None => (PutStatus::Inserted, now),
        };

        let name = upload.name.clone();
        let mut next = self.records.clone();
        next.insert(
            name.clone(),
            FileRecord {
                name: upload.name,
                size: upload.size,
                last_modified_at: upload.last_modified_at,
                uploaded_at,
                parsed: upload.parsed,
            },
        );
        if status == PutStatus::Inserted {
            self.evict_over_capacity(&mut next, &name);
        }

        self.persist(&next)?;
        self.records = next;
        log::info!("Cached {name} ({status:?})");
        Ok(status)
    }

    pub fn get(&self, name: &str) -> Result<&ParsedFile, CacheError> {
        self.records
            .get(name)
            .map(|r| &r.parsed)
            .ok_or_else(|| CacheError::NotFound(name.to_string()))
    }

    pub fn record(&self, name: &str) -> Option<&FileRecord> {
        self.records.get(name)
    }

    /// All records ordered by name.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_store(self) -> Box<dyn KeyValueStore> {
        self.store
    }

    fn persist(&mut self, records: &BTreeMap<String, FileRecord>) -> Result<(), CacheError> {
        let json = serde_json::to_string(records)?;
        self.store.set(STORE_KEY, json)?;
        Ok(())
    }

    fn evict_over_capacity(&self, records: &mut BTreeMap<String, FileRecord>, keep: &str) {
        let Some(max) = self.policy.max_files else {
            return;
        };
        let max = max.max(1);
        while records.len() > max {
            let oldest = records
                .values()
                .filter(|r| r.name != keep)
                .min_by_key(|r| r.uploaded_at)
                .map(|r| r.name.clone());
            match oldest {
                Some(name) => {
                    log::info!("Evicting {name} (cache limit {max})");
                    records.remove(&name);
                }
                None => break,
            }
        }
    }
}

/// Format a byte count with the largest unit that keeps the magnitude below 1024.
pub fn human_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

    let mut unit = 0;
    while unit < UNITS.len() - 1 && bytes >= 1u64 << (10 * (unit + 1)) {
        unit += 1;
    }
    let mut rounded = round2(bytes as f64 / (1u64 << (10 * unit)) as f64);
    if rounded >= 1024.0 && unit < UNITS.len() - 1 {
        unit += 1;
        rounded = round2(bytes as f64 / (1u64 << (10 * unit)) as f64);
    }

    let text = format!("{rounded:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {}", UNITS[unit])
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
