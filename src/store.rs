use std::collections::HashMap;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::patterns::{self, Classification, Direction, RuleThresholds};
use crate::record::{ColumnMap, RawInput};
use crate::storage::KvStore;

const STORE_VERSION: u32 = 2;
const MISS_STORE_KEY: &str = "miner_miss_patterns_v2";
const HIT_STORE_KEY: &str = "miner_hit_patterns_v2";
// Pre-rework flat array, shared by both directions.
const LEGACY_KEY: &str = "patternDB";
const MAX_DETAILS: usize = 20;

/// Aggregate statistics for one named pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    pub pattern_id: String,
    pub occurrences: u64,
    #[serde(default)]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreFile {
    version: u32,
    patterns: HashMap<String, PatternRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyEntry {
    name: String,
    status: String,
    #[serde(default)]
    count: f64,
    #[serde(default)]
    miss_rate: Option<f64>,
    #[serde(default)]
    success_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub processed: usize,
    pub failed: usize,
    pub distinct_patterns: usize,
}

/// Frequency store for one pattern direction. Owns the in-memory aggregate
/// and mirrors it to durable storage under a versioned key; the miss and
/// hit stores never share keys or counts.
pub struct PatternStore {
    direction: Direction,
    columns: ColumnMap,
    thresholds: RuleThresholds,
    ready: bool,
    rebuilding: bool,
    patterns: HashMap<String, PatternRecord>,
}

impl PatternStore {
    pub fn new(direction: Direction, columns: ColumnMap, thresholds: RuleThresholds) -> Self {
        Self {
            direction,
            columns,
            thresholds,
            ready: false,
            rebuilding: false,
            patterns: HashMap::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Defensive copy; callers cannot mutate internal counts.
    pub fn patterns(&self) -> HashMap<String, PatternRecord> {
        self.patterns.clone()
    }

    fn storage_key(&self) -> &'static str {
        match self.direction {
            Direction::Miss => MISS_STORE_KEY,
            Direction::Hit => HIT_STORE_KEY,
        }
    }

    /// Loads the versioned snapshot, falling back to a best-effort
    /// translation of the legacy flat-array shape. Corrupt primary bytes
    /// are deleted so a later rebuild is not blocked by them; total
    /// failure leaves the store empty and not ready.
    pub fn load(&mut self, kv: &dyn KvStore) {
        match kv.get(self.storage_key()) {
            Ok(Some(raw)) => match serde_json::from_str::<StoreFile>(&raw) {
                Ok(file) if file.version == STORE_VERSION => {
                    self.patterns = file.patterns;
                    self.ready = true;
                    return;
                }
                Ok(file) => {
                    warn!(
                        key = self.storage_key(),
                        version = file.version,
                        "pattern store version mismatch, discarding"
                    );
                    let _ = kv.remove(self.storage_key());
                }
                Err(err) => {
                    warn!(key = self.storage_key(), %err, "corrupt pattern store, discarding");
                    let _ = kv.remove(self.storage_key());
                }
            },
            Ok(None) => {}
            Err(err) => {
                warn!(key = self.storage_key(), %err, "pattern store read failed");
                return;
            }
        }

        if self.recover_legacy(kv) {
            self.ready = true;
            self.persist(kv);
        }
    }

    fn recover_legacy(&mut self, kv: &dyn KvStore) -> bool {
        let raw = match kv.get(LEGACY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(err) => {
                warn!(%err, "legacy pattern read failed");
                return false;
            }
        };
        let entries = match serde_json::from_str::<Vec<LegacyEntry>>(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(%err, "legacy pattern payload did not parse");
                return false;
            }
        };

        let want_status = match self.direction {
            Direction::Miss => "miss",
            Direction::Hit => "success",
        };
        let mut recovered = 0usize;
        for entry in entries {
            if entry.status != want_status {
                continue;
            }
            let rate = match self.direction {
                Direction::Miss => entry.miss_rate,
                Direction::Hit => entry.success_rate,
            }
            .unwrap_or(0.0);
            // Legacy rates appear both as fractions and as percentages.
            let rate = if rate > 1.0 { rate / 100.0 } else { rate };
            let occurrences = (entry.count.max(0.0) * rate).round() as u64;
            self.patterns.insert(
                entry.name.clone(),
                PatternRecord {
                    pattern_id: entry.name,
                    occurrences,
                    details: Vec::new(),
                },
            );
            recovered += 1;
        }
        debug!(recovered, direction = self.direction.label(), "legacy patterns recovered");
        recovered > 0
    }

    /// Drops all counts, re-scans every input and persists the result.
    /// A failure on one input never aborts the pass; it is counted and
    /// skipped. Records without a settled result are excluded upstream by
    /// the normalizer and count as processed.
    pub fn rebuild(&mut self, inputs: &[RawInput], kv: &dyn KvStore) -> Result<RebuildReport> {
        if self.rebuilding {
            bail!("rebuild already in flight");
        }
        self.rebuilding = true;
        self.patterns.clear();

        let mut report = RebuildReport::default();
        for (row, input) in inputs.iter().enumerate() {
            match crate::record::normalize(input, &self.columns, row) {
                Ok(Some(record)) => {
                    report.processed += 1;
                    match patterns::classify(&record, self.direction, &self.thresholds) {
                        Classification::Matched(ids) => {
                            for id in ids {
                                self.bump(&id.to_string(), &format!("row {row}"));
                            }
                        }
                        Classification::NoMatch => {}
                        Classification::Error(reason) => {
                            debug!(row, %reason, "record skipped by classifier");
                        }
                    }
                }
                Ok(None) => {
                    report.processed += 1;
                }
                Err(err) => {
                    report.failed += 1;
                    debug!(row, %err, "record failed normalization");
                }
            }
        }

        report.distinct_patterns = self.patterns.len();
        self.ready = true;
        self.rebuilding = false;
        self.persist(kv);
        Ok(report)
    }

    fn bump(&mut self, id: &str, context: &str) {
        let entry = self
            .patterns
            .entry(id.to_string())
            .or_insert_with(|| PatternRecord {
                pattern_id: id.to_string(),
                occurrences: 0,
                details: Vec::new(),
            });
        entry.occurrences += 1;
        if entry.details.len() < MAX_DETAILS {
            entry.details.push(context.to_string());
        }
    }

    /// Checks one record against the known patterns. Returns a display
    /// message when anything matches; `None` when the store is not built
    /// yet, the record does not qualify, or nothing matches.
    pub fn verify(&self, input: &RawInput) -> Option<String> {
        if !self.ready {
            return None;
        }
        let record = match crate::record::normalize(input, &self.columns, 0) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(err) => {
                debug!(%err, "verify: record failed normalization");
                return None;
            }
        };
        match patterns::classify(&record, self.direction, &self.thresholds) {
            Classification::Matched(ids) => {
                let names: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                Some(format!(
                    "{} {}: {}",
                    self.direction.marker(),
                    self.direction.label(),
                    names.join(", ")
                ))
            }
            Classification::NoMatch => None,
            Classification::Error(reason) => {
                debug!(%reason, "verify: record not classifiable");
                None
            }
        }
    }

    /// Folds a remote snapshot into the local aggregate. Applying the same
    /// snapshot twice is a no-op: counts take the max of both sides.
    pub fn merge_snapshot(
        &mut self,
        remote: &HashMap<String, PatternRecord>,
        kv: &dyn KvStore,
    ) {
        for (id, incoming) in remote {
            let entry = self
                .patterns
                .entry(id.clone())
                .or_insert_with(|| PatternRecord {
                    pattern_id: incoming.pattern_id.clone(),
                    occurrences: 0,
                    details: Vec::new(),
                });
            entry.occurrences = entry.occurrences.max(incoming.occurrences);
            for detail in &incoming.details {
                if entry.details.len() >= MAX_DETAILS {
                    break;
                }
                if !entry.details.contains(detail) {
                    entry.details.push(detail.clone());
                }
            }
        }
        if !remote.is_empty() {
            self.ready = true;
        }
        self.persist(kv);
    }

    fn persist(&self, kv: &dyn KvStore) {
        let file = StoreFile {
            version: STORE_VERSION,
            patterns: self.patterns.clone(),
        };
        let json = match serde_json::to_string(&file) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, "pattern store serialize failed");
                return;
            }
        };
        if let Err(err) = kv.set(self.storage_key(), &json) {
            warn!(key = self.storage_key(), %err, "pattern store persist failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;

    fn miss_store() -> PatternStore {
        PatternStore::new(
            Direction::Miss,
            ColumnMap::default(),
            RuleThresholds::default(),
        )
    }

    fn table_row(hybrid: &str, upset: &str, result: &str) -> RawInput {
        let cells = vec![
            "2026-03-01",
            "Reds",
            "Blues",
            hybrid,
            "Draw",
            "AwayWin",
            "HomeWin",
            "Draw",
            "",
            upset,
            "",
            "",
            "",
            "",
            result,
        ];
        RawInput::TableRow {
            cells: cells.into_iter().map(str::to_string).collect(),
        }
    }

    #[test]
    fn rebuild_counts_and_persists() {
        let kv = MemoryKv::new();
        let mut store = miss_store();
        let inputs = vec![
            table_row("HomeWin", "0.5", "0-1"), // miss, PAT_C
            table_row("HomeWin", "0.1", "2-0"), // hit, out of scope here
            table_row("HomeWin", "", "N/A"),    // pending, excluded
        ];
        let report = store.rebuild(&inputs, &kv).unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.distinct_patterns, 1);

        let patterns = store.patterns();
        assert_eq!(patterns["PAT_C_HIGH_UPSET_SCORE_DIFF"].occurrences, 1);

        // Round-trips through durable storage.
        let mut reloaded = miss_store();
        reloaded.load(&kv);
        assert!(reloaded.is_ready());
        assert_eq!(reloaded.patterns(), patterns);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let kv = MemoryKv::new();
        let mut store = miss_store();
        let inputs = vec![
            table_row("HomeWin", "0.5", "0-1"),
            table_row("HomeWin", "-0.9", "1-2"),
        ];
        let first = store.rebuild(&inputs, &kv).unwrap();
        let first_patterns = store.patterns();
        let second = store.rebuild(&inputs, &kv).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.patterns(), first_patterns);
    }

    #[test]
    fn rebuild_skips_bad_records() {
        let kv = MemoryKv::new();
        let mut store = miss_store();
        let inputs = vec![
            RawInput::TableRow {
                cells: vec!["too".to_string(), "short".to_string()],
            },
            table_row("HomeWin", "0.5", "0-1"),
        ];
        let report = store.rebuild(&inputs, &kv).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.distinct_patterns, 1);
    }

    #[test]
    fn verify_requires_ready() {
        let store = miss_store();
        assert!(store.verify(&table_row("HomeWin", "0.5", "0-1")).is_none());
    }

    #[test]
    fn verify_formats_matches() {
        let kv = MemoryKv::new();
        let mut store = miss_store();
        store.rebuild(&[], &kv).unwrap();
        let msg = store
            .verify(&table_row("HomeWin", "0.5", "0-1"))
            .expect("pattern should match");
        assert!(msg.contains("Miss patterns"));
        assert!(msg.contains("PAT_C_HIGH_UPSET_SCORE_DIFF"));
    }

    #[test]
    fn corrupt_primary_is_deleted_then_legacy_recovers() {
        let kv = MemoryKv::new();
        kv.set(MISS_STORE_KEY, "{definitely not json").unwrap();
        kv.set(
            LEGACY_KEY,
            r#"[
                {"name": "X", "status": "miss", "count": 10, "miss_rate": 0.4},
                {"name": "Y", "status": "success", "count": 8, "success_rate": 0.5}
            ]"#,
        )
        .unwrap();

        let mut store = miss_store();
        store.load(&kv);
        assert!(store.is_ready());
        let patterns = store.patterns();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns["X"].occurrences, 4);

        // The corrupt primary was replaced by a fresh snapshot.
        let raw = kv.get(MISS_STORE_KEY).unwrap().unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
    }

    #[test]
    fn legacy_percent_rates_are_scaled() {
        let kv = MemoryKv::new();
        kv.set(
            LEGACY_KEY,
            r#"[{"name": "Z", "status": "miss", "count": 120, "miss_rate": 65.5}]"#,
        )
        .unwrap();
        let mut store = miss_store();
        store.load(&kv);
        assert_eq!(store.patterns()["Z"].occurrences, 79);
    }

    #[test]
    fn hit_and_miss_stores_do_not_share_keys() {
        let kv = MemoryKv::new();
        let mut miss = miss_store();
        miss.rebuild(&[table_row("HomeWin", "0.5", "0-1")], &kv).unwrap();

        let mut hit = PatternStore::new(
            Direction::Hit,
            ColumnMap::default(),
            RuleThresholds::default(),
        );
        hit.rebuild(&[], &kv).unwrap();
        assert!(hit.patterns().is_empty());
        assert_eq!(miss.patterns().len(), 1);
        assert!(kv.get(MISS_STORE_KEY).unwrap().is_some());
        assert!(kv.get(HIT_STORE_KEY).unwrap().is_some());
    }

    #[test]
    fn merge_snapshot_is_idempotent() {
        let kv = MemoryKv::new();
        let mut store = miss_store();
        store.rebuild(&[table_row("HomeWin", "0.5", "0-1")], &kv).unwrap();

        let mut remote = HashMap::new();
        remote.insert(
            "PAT_C_HIGH_UPSET_SCORE_DIFF".to_string(),
            PatternRecord {
                pattern_id: "PAT_C_HIGH_UPSET_SCORE_DIFF".to_string(),
                occurrences: 7,
                details: vec!["remote sample".to_string()],
            },
        );
        store.merge_snapshot(&remote, &kv);
        let once = store.patterns();
        assert_eq!(once["PAT_C_HIGH_UPSET_SCORE_DIFF"].occurrences, 7);

        store.merge_snapshot(&remote, &kv);
        assert_eq!(store.patterns(), once);
    }
}
