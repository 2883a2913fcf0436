//! Flat-file JSON document store for entries, settings, and per-day flags.
//!
//! The whole document is held in memory behind a lock and rewritten on every
//! mutation; fine for a single-user desktop log measured in thousands of
//! entries.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    sync::{Arc, RwLock},
};

use crate::settings::Settings;
use crate::slots;

/// A persisted labeled interval. Natural key is `(day, start)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    /// 'YYYY-MM-DD'
    pub day: String,
    /// 'HH:MM'
    pub start: String,
    /// 'HH:MM'
    pub end: String,
    pub description: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// `(day, start)` rendered in slot-key form.
    pub fn key(&self) -> String {
        format!("{}T{}", self.day, self.start)
    }
}

/// Per-day roll-up for the day list view.
#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub day: String,
    pub slots: usize,
    pub exported: bool,
}

/// One grouped row of a day's summary.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub description: String,
    pub category: String,
    pub slots: usize,
    pub minutes: u32,
}

/// Distinct task recall item, newest use first.
#[derive(Debug, Clone, Serialize)]
pub struct RecentTask {
    pub description: String,
    pub category: String,
    pub uses: usize,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    entries: Vec<Entry>,
    settings: Settings,
    #[serde(default)]
    external_logged: BTreeMap<String, bool>,
    #[serde(rename = "_seq", default = "seq_seed")]
    seq: u64,
}

fn seq_seed() -> u64 {
    1
}

impl Default for Document {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            settings: Settings::default(),
            external_logged: BTreeMap::new(),
            seq: 1,
        }
    }
}

struct StoreInner {
    path: PathBuf,
    data: RwLock<Document>,
}

/// Cheap-to-clone handle over the shared document.
#[derive(Clone)]
pub struct EntryStore {
    inner: Arc<StoreInner>,
}

impl EntryStore {
    /// Open (or create) the document at `path`. An unreadable document is
    /// replaced by the default shape rather than failing startup.
    pub fn open(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Document::default()
        };

        let store = Self {
            inner: Arc::new(StoreInner {
                path,
                data: RwLock::new(data),
            }),
        };
        if !store.inner.path.exists() {
            let guard = store.inner.data.read().unwrap();
            store.persist(&guard)?;
        }
        Ok(store)
    }

    pub fn get_settings(&self) -> Settings {
        self.inner.data.read().unwrap().settings.clone()
    }

    /// Persist settings after coercing invalid fields; returns the stored copy.
    pub fn save_settings(&self, settings: Settings) -> Result<Settings> {
        let normalized = settings.normalized();
        {
            let mut guard = self.inner.data.write().unwrap();
            guard.settings = normalized.clone();
            self.persist(&guard)?;
        }
        Ok(normalized)
    }

    pub fn entries_for_day(&self, day: &str) -> Vec<Entry> {
        let guard = self.inner.data.read().unwrap();
        let mut entries: Vec<Entry> = guard
            .entries
            .iter()
            .filter(|e| e.day == day)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.start.cmp(&b.start));
        entries
    }

    /// Batch upsert by `(day, start)`. Incoming fields win, but a missing
    /// `created_at` keeps the previously stored timestamp.
    pub fn save_entries(&self, entries: &[Entry]) -> Result<()> {
        let now = Utc::now();
        let mut guard = self.inner.data.write().unwrap();

        let mut by_key: BTreeMap<String, Entry> = guard
            .entries
            .drain(..)
            .map(|e| (e.key(), e))
            .collect();

        for raw in entries {
            let mut e = raw.clone();
            if e.created_at.is_none() {
                e.created_at = by_key
                    .get(&e.key())
                    .and_then(|prev| prev.created_at)
                    .or(Some(now));
            }
            by_key.insert(e.key(), e);
        }

        // BTreeMap keyed by "{day}T{start}" already yields (day, start) order.
        guard.entries = by_key.into_values().collect();
        guard.seq += 1;
        self.persist(&guard)
    }

    /// Remove the entry with key `(day, start)`; returns 0 or 1.
    pub fn delete_entry(&self, day: &str, start: &str) -> Result<usize> {
        let mut guard = self.inner.data.write().unwrap();
        let before = guard.entries.len();
        guard.entries.retain(|e| !(e.day == day && e.start == start));
        let removed = before - guard.entries.len();
        if removed > 0 {
            self.persist(&guard)?;
        }
        Ok(removed)
    }

    /// Per-day boolean annotation (e.g. "pushed to the external system").
    /// Orthogonal to scheduling; stored and returned untouched.
    pub fn external_logged(&self, day: &str) -> bool {
        self.inner
            .data
            .read()
            .unwrap()
            .external_logged
            .get(day)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_external_logged(&self, day: &str, value: bool) -> Result<()> {
        let mut guard = self.inner.data.write().unwrap();
        guard.external_logged.insert(day.to_string(), value);
        self.persist(&guard)
    }

    /// Days with at least one entry, newest first.
    pub fn days(&self) -> Vec<DaySummary> {
        let guard = self.inner.data.read().unwrap();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for e in &guard.entries {
            *counts.entry(e.day.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .rev()
            .map(|(day, slots)| DaySummary {
                day: day.to_string(),
                slots,
                exported: guard.external_logged.get(day).copied().unwrap_or(false),
            })
            .collect()
    }

    /// A day's entries grouped by (description, category), largest share first.
    pub fn day_summary(&self, day: &str) -> Vec<SummaryRow> {
        let guard = self.inner.data.read().unwrap();
        let slot_minutes = slots::slot_minutes(&guard.settings);
        let mut grouped: BTreeMap<(String, String), usize> = BTreeMap::new();
        for e in guard.entries.iter().filter(|e| e.day == day) {
            *grouped
                .entry((e.description.clone(), e.category.clone()))
                .or_default() += 1;
        }
        let mut rows: Vec<SummaryRow> = grouped
            .into_iter()
            .map(|((description, category), slots)| SummaryRow {
                description,
                category,
                minutes: slots as u32 * slot_minutes,
                slots,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.minutes
                .cmp(&a.minutes)
                .then_with(|| a.description.cmp(&b.description))
        });
        rows
    }

    /// Distinct (description, category) pairs ordered by most recent use.
    pub fn recent_tasks(&self, limit: usize) -> Vec<RecentTask> {
        let guard = self.inner.data.read().unwrap();
        let mut grouped: BTreeMap<(String, String), RecentTask> = BTreeMap::new();
        for e in &guard.entries {
            let item = grouped
                .entry((e.description.clone(), e.category.clone()))
                .or_insert_with(|| RecentTask {
                    description: e.description.clone(),
                    category: e.category.clone(),
                    uses: 0,
                    last_used: None,
                });
            item.uses += 1;
            if e.created_at > item.last_used {
                item.last_used = e.created_at;
            }
        }
        let mut items: Vec<RecentTask> = grouped.into_values().collect();
        items.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        items.truncate(limit);
        items
    }

    fn persist(&self, data: &Document) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.inner.path, serialized)
            .with_context(|| format!("Failed to write store to {}", self.inner.path.display()))
    }
}
