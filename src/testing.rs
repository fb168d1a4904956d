//! Fakes shared by the unit tests

use crate::backend::{Acquired, Backend};
use crate::closer::{Closer, CloserRegistry};
use crate::table::{CountingTable, ReadError, TableEntries, Tables};
use crate::target::Target;
use crate::{Result, SslcountError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Shared record of which fake resources were closed or dropped.
#[derive(Clone, Default)]
pub struct CloseLog {
    closed: Arc<Mutex<Vec<String>>>,
    dropped: Arc<Mutex<Vec<String>>>,
}

impl CloseLog {
    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    pub fn dropped(&self) -> Vec<String> {
        self.dropped.lock().unwrap().clone()
    }
}

pub struct RecordingCloser {
    name: String,
    fail: bool,
    closed: bool,
    log: CloseLog,
}

impl RecordingCloser {
    pub fn new(name: &str, log: &CloseLog) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            closed: false,
            log: log.clone(),
        }
    }

    pub fn failing(name: &str, log: &CloseLog) -> Self {
        let mut closer = Self::new(name, log);
        closer.fail = true;
        closer
    }
}

#[async_trait]
impl Closer for RecordingCloser {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.closed = true;
        this.log.closed.lock().unwrap().push(this.name.clone());
        if this.fail {
            return Err(SslcountError::CloseFailed {
                resource: this.name.clone(),
                reason: "injected".to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for RecordingCloser {
    fn drop(&mut self) {
        if !self.closed {
            self.log.dropped.lock().unwrap().push(self.name.clone());
        }
    }
}

/// One scripted table snapshot; `fail_after` injects an error after that many
/// entries have been yielded.
#[derive(Clone, Default)]
pub struct Snapshot {
    pub entries: Vec<(u32, u32)>,
    pub fail_after: Option<usize>,
}

impl Snapshot {
    pub fn of(entries: &[(u32, u32)]) -> Self {
        Self {
            entries: entries.to_vec(),
            fail_after: None,
        }
    }

    pub fn failing_after(entries: &[(u32, u32)], n: usize) -> Self {
        Self {
            entries: entries.to_vec(),
            fail_after: Some(n),
        }
    }
}

/// In-memory table that advances to the next snapshot on every walk and
/// keeps returning the last one once the script runs out.
#[derive(Clone, Default)]
pub struct ScriptedTable {
    script: Arc<Mutex<VecDeque<Snapshot>>>,
    current: Arc<Mutex<Snapshot>>,
}

impl ScriptedTable {
    pub fn new(script: Vec<Snapshot>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            current: Arc::default(),
        }
    }

    pub fn fixed(entries: &[(u32, u32)]) -> Self {
        Self::new(vec![Snapshot::of(entries)])
    }
}

impl CountingTable for ScriptedTable {
    fn entries(&self) -> TableEntries<'_> {
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *self.current.lock().unwrap() = next;
        }
        let snapshot = self.current.lock().unwrap().clone();
        let limit = snapshot.fail_after.unwrap_or(usize::MAX);

        let ok = snapshot.entries.into_iter().take(limit).map(Ok);
        let err = snapshot
            .fail_after
            .map(|_| Err(ReadError("injected".to_string())));
        Box::new(ok.chain(err))
    }
}

/// Backend that hands out scripted tables and recording closers, optionally
/// failing after every closer was acquired.
pub struct FakeBackend {
    log: CloseLog,
    tables: Vec<(String, ScriptedTable)>,
    closers: Vec<String>,
    failing_closer: Option<String>,
    fail: bool,
}

impl FakeBackend {
    pub fn new(log: &CloseLog) -> Self {
        Self {
            log: log.clone(),
            tables: Vec::new(),
            closers: Vec::new(),
            failing_closer: None,
            fail: false,
        }
    }

    pub fn with_table(mut self, name: &str, table: ScriptedTable) -> Self {
        self.tables.push((name.to_string(), table));
        self
    }

    pub fn with_closers(mut self, names: &[&str]) -> Self {
        self.closers.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_failing_closer(mut self, name: &str) -> Self {
        self.failing_closer = Some(name.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn acquire(self, _target: &Target) -> Result<Acquired> {
        let mut closers = CloserRegistry::new();
        for name in &self.closers {
            let closer = if self.failing_closer.as_deref() == Some(name.as_str()) {
                RecordingCloser::failing(name, &self.log)
            } else {
                RecordingCloser::new(name, &self.log)
            };
            closers.push(Box::new(closer));
        }

        if self.fail {
            closers.release_all().await;
            return Err(SslcountError::AttachFailed("injected".to_string()));
        }

        let tables: Tables = self
            .tables
            .into_iter()
            .map(|(name, t)| (name, Box::new(t) as Box<dyn CountingTable>))
            .collect();
        Ok(Acquired { tables, closers })
    }
}
