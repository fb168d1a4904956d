//! Counting tables: kernel-resident key -> counter maps read by the poller
//!
//! The kernel side mutates these concurrently; every walk is a best-effort
//! snapshot with no consistency guarantee between entries.

use sslcount_common::{TableKey, TableValue};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error reported by a table in the middle of a walk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ReadError(pub String);

pub type TableEntries<'a> =
    Box<dyn Iterator<Item = std::result::Result<(TableKey, TableValue), ReadError>> + 'a>;

/// A named table of per-process counters.
pub trait CountingTable: Send {
    /// Start an independent walk over the current entries, in no particular order.
    fn entries(&self) -> TableEntries<'_>;
}

/// Tables by logical name. Ordered so every poll walks them the same way.
pub type Tables = BTreeMap<String, Box<dyn CountingTable>>;

#[cfg(target_os = "linux")]
impl<T> CountingTable for aya::maps::HashMap<T, TableKey, TableValue>
where
    T: std::borrow::Borrow<aya::maps::MapData> + Send,
{
    fn entries(&self) -> TableEntries<'_> {
        Box::new(
            self.iter()
                .map(|entry| entry.map_err(|e| ReadError(e.to_string()))),
        )
    }
}
