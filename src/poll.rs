//! Poll/diff engine
//!
//! Walks every counting table and reports the entries whose value differs
//! from the last value reported for that key. Counters only grow and the
//! tables never evict, so comparing against the last seen value (0 for a new
//! key) is enough to detect change.

use crate::table::Tables;
use crate::SslcountError;
use sslcount_common::{TableKey, TableValue};
use std::collections::HashMap;
use std::fmt;
use tracing::error;

/// One counter that moved since the previous poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: String,
    pub key: TableKey,
    pub count: TableValue,
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table={} key={} [{:x}] count={}",
            self.table, self.key, self.key, self.count
        )
    }
}

/// Result of a single poll cycle.
#[derive(Debug, Default)]
pub struct PollReport {
    pub changes: Vec<ChangeEvent>,
    /// Tables whose walk failed part-way; changes seen before the failure are
    /// still in `changes`.
    pub failures: Vec<SslcountError>,
}

/// Last reported value per key, per table.
///
/// Keys are never removed once seen.
#[derive(Debug, Default)]
pub struct PollState {
    observed: HashMap<String, HashMap<TableKey, TableValue>>,
    cycles: u64,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk every table once and record what changed.
    pub fn poll(&mut self, tables: &Tables) -> PollReport {
        let mut report = PollReport::default();
        self.cycles += 1;

        for (name, table) in tables {
            let seen = self.observed.entry(name.clone()).or_default();

            for entry in table.entries() {
                let (key, value) = match entry {
                    Ok(kv) => kv,
                    Err(e) => {
                        error!("Iterator encountered an error on table {}: {}", name, e);
                        report.failures.push(SslcountError::Iteration {
                            table: name.clone(),
                            reason: e.to_string(),
                        });
                        break;
                    }
                };

                let last = seen.get(&key).copied().unwrap_or(0);
                if value == last {
                    continue;
                }
                seen.insert(key, value);
                report.changes.push(ChangeEvent {
                    table: name.clone(),
                    key,
                    count: value,
                });
            }
        }

        report
    }

    /// Last reported value for `key`, if it has ever changed.
    pub fn last_seen(&self, table: &str, key: TableKey) -> Option<TableValue> {
        self.observed.get(table)?.get(&key).copied()
    }

    pub fn tracked_keys(&self, table: &str) -> usize {
        self.observed.get(table).map_or(0, HashMap::len)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
