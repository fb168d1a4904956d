#![allow(dead_code)]

use async_trait::async_trait;
use sslcount::backend::{Acquired, Backend};
use sslcount::closer::{Closer, CloserRegistry};
use sslcount::table::{CountingTable, TableEntries, Tables};
use sslcount::target::Target;
use sslcount::{Result, SslcountError};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Names of closers in the order they were released.
pub type Released = Arc<Mutex<Vec<String>>>;

pub struct NamedCloser {
    pub name: String,
    pub released: Released,
}

#[async_trait]
impl Closer for NamedCloser {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.released.lock().unwrap().push(self.name.clone());
        Ok(())
    }
}

/// Table whose contents can be changed from the test while it is polled.
#[derive(Clone, Default)]
pub struct SharedTable {
    entries: Arc<Mutex<BTreeMap<u32, u32>>>,
}

impl SharedTable {
    pub fn set(&self, key: u32, count: u32) {
        self.entries.lock().unwrap().insert(key, count);
    }
}

impl CountingTable for SharedTable {
    fn entries(&self) -> TableEntries<'_> {
        let snapshot: Vec<_> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| Ok((*k, *v)))
            .collect();
        Box::new(snapshot.into_iter())
    }
}

/// Backend that hands out one table and a fixed list of closers.
pub struct StubBackend {
    pub table: SharedTable,
    pub closers: Vec<&'static str>,
    pub released: Released,
    pub fail: bool,
}

#[async_trait]
impl Backend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn acquire(self, _target: &Target) -> Result<Acquired> {
        let mut closers = CloserRegistry::new();
        for name in &self.closers {
            closers.push(Box::new(NamedCloser {
                name: name.to_string(),
                released: self.released.clone(),
            }));
        }
        if self.fail {
            closers.release_all().await;
            return Err(SslcountError::TargetNotFound {
                path: "/nonexistent/libssl.so".into(),
            });
        }

        let mut tables = Tables::new();
        tables.insert(
            "rcount".to_string(),
            Box::new(self.table) as Box<dyn CountingTable>,
        );
        Ok(Acquired { tables, closers })
    }
}

/// Opener that serves a `SharedTable` and remembers the requested path.
#[derive(Clone, Default)]
pub struct RecordingOpener {
    pub table: SharedTable,
    pub opened: Arc<Mutex<Vec<std::path::PathBuf>>>,
}

impl sslcount::backend::delegated::PinnedTableOpener for RecordingOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn CountingTable>> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        Ok(Box::new(self.table.clone()))
    }
}
