//! Setup: run the active backend and hand back tables plus closers

use crate::backend::{Acquired, Backend};
use crate::target::Target;
use crate::Result;
use tracing::{error, info};

/// Acquire probes and tables for `target` through `backend`.
///
/// The backend has already rolled back whatever it acquired when this
/// returns an error.
pub async fn setup<B: Backend>(backend: B, target: &Target) -> Result<Acquired> {
    let name = backend.name();
    info!("Setting up {} probes on {}", name, target);

    match backend.acquire(target).await {
        Ok(acquired) => {
            info!(
                "Setup complete: tables={:?} resources={}",
                acquired.tables.keys().collect::<Vec<_>>(),
                acquired.closers.len()
            );
            Ok(acquired)
        }
        Err(e) => {
            error!("{} setup failed: {}", name, e);
            Err(e)
        }
    }
}
