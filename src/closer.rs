//! Releasable handles and the ordered registry that owns them
//!
//! Every kernel-side or agent-side object acquired during setup is wrapped in
//! a [`Closer`] and pushed onto a [`CloserRegistry`] before the next
//! acquisition step starts. Releasing walks the registry in reverse order and
//! keeps going past individual failures.

use crate::{Result, SslcountError};
use async_trait::async_trait;
use tracing::{debug, error, warn};

/// One acquired resource (connection, attached probe, loaded program, ...).
///
/// `close` consumes the handle, so a resource cannot be released twice.
#[async_trait]
pub trait Closer: Send {
    /// Short human-readable description used in logs.
    fn describe(&self) -> String;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Outcome of [`CloserRegistry::release_all`].
#[derive(Debug, Default)]
pub struct ReleaseReport {
    pub released: usize,
    pub failures: Vec<SslcountError>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered registry of acquired resources.
///
/// Dropping a registry that still holds closers drops them in reverse
/// acquisition order, which is the best-effort path on abnormal exit.
#[derive(Default)]
pub struct CloserRegistry {
    closers: Vec<Box<dyn Closer>>,
}

impl CloserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, closer: Box<dyn Closer>) {
        debug!("Registered {} (#{})", closer.describe(), self.closers.len());
        self.closers.push(closer);
    }

    pub fn len(&self) -> usize {
        self.closers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closers.is_empty()
    }

    /// Descriptions in acquisition order.
    pub fn descriptions(&self) -> Vec<String> {
        self.closers.iter().map(|c| c.describe()).collect()
    }

    /// Release every closer exactly once, newest first.
    pub async fn release_all(mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        while let Some(closer) = self.closers.pop() {
            let what = closer.describe();
            match closer.close().await {
                Ok(()) => {
                    debug!("Released {}", what);
                    report.released += 1;
                }
                Err(e) => {
                    error!("Error attempting to release {}: {}", what, e);
                    report.failures.push(e);
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for CloserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.descriptions()).finish()
    }
}

impl Drop for CloserRegistry {
    fn drop(&mut self) {
        if self.closers.is_empty() {
            return;
        }
        warn!(
            "{} resources were not released explicitly, dropping them",
            self.closers.len()
        );
        while let Some(closer) = self.closers.pop() {
            debug!("Dropping {}", closer.describe());
            drop(closer);
        }
    }
}
