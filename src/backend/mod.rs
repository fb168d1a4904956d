//! Probe acquisition backends
//!
//! A [`Backend`] attaches the entry/return probes for a [`Target`] and hands
//! back the counting tables plus every resource it acquired. Two variants
//! exist and exactly one is compiled in as [`ActiveBackend`]:
//! - [`local::LocalLoader`]: loads and attaches in-process with aya
//! - [`delegated::DelegatedLoader`]: asks a bpfman agent to do it and opens
//!   the pinned table it reports (cargo feature `delegated`)
//!
//! Either variant releases everything it acquired before returning an error.

pub mod delegated;
pub mod local;

#[cfg(unix)]
pub mod agent;
#[cfg(target_os = "linux")]
pub mod kernel;

use crate::closer::CloserRegistry;
use crate::table::Tables;
use crate::target::Target;
use crate::Result;
use async_trait::async_trait;

/// Tables and the resources backing them, in acquisition order.
pub struct Acquired {
    pub tables: Tables,
    pub closers: CloserRegistry,
}

impl std::fmt::Debug for Acquired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquired")
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .field("closers", &self.closers)
            .finish()
    }
}

#[async_trait]
pub trait Backend: Send {
    fn name(&self) -> &'static str;

    /// Acquire probes and tables for `target`.
    ///
    /// On error nothing acquired by this call is left behind.
    async fn acquire(self, target: &Target) -> Result<Acquired>;
}

#[cfg(all(target_os = "linux", not(feature = "delegated")))]
pub type ActiveBackend = local::LocalLoader<kernel::AyaInstrumentation>;

#[cfg(all(target_os = "linux", feature = "delegated"))]
pub type ActiveBackend = delegated::DelegatedLoader<agent::GrpcConnector, kernel::PinnedMapOpener>;

/// Build the backend variant selected at compile time.
#[cfg(all(target_os = "linux", not(feature = "delegated")))]
pub fn build(_settings: &crate::config::Settings) -> Result<ActiveBackend> {
    Ok(local::LocalLoader::new(kernel::AyaInstrumentation::embedded()))
}

/// Build the backend variant selected at compile time.
#[cfg(all(target_os = "linux", feature = "delegated"))]
pub fn build(settings: &crate::config::Settings) -> Result<ActiveBackend> {
    let connector = agent::GrpcConnector::new(settings.agent_endpoint()?);
    Ok(delegated::DelegatedLoader::new(
        connector,
        kernel::PinnedMapOpener,
        settings.bytecode(),
    )
    .with_embedded_object(kernel::embedded_object()))
}
