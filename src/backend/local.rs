//! In-process loader: attaches the probes directly into the local kernel

use super::{Acquired, Backend};
use crate::closer::{Closer, CloserRegistry};
use crate::table::Tables;
use crate::target::{ProbeKind, Target};
use crate::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Operations the local loader needs from the instrumentation library.
///
/// Every method that creates a kernel object hands it back as a [`Closer`]
/// so the loader controls registration order and rollback.
pub trait Instrumentation: Send {
    /// Lift resource limits that would prevent creating kernel objects.
    fn remove_memlock_limit(&mut self) -> Result<()>;

    /// Load and verify the program bundle.
    fn load_bundle(&mut self) -> Result<Box<dyn Closer>>;

    /// Open the target executable image.
    fn open_target(&mut self, target: &Target) -> Result<()>;

    /// Attach one probe to the target symbol.
    fn attach(&mut self, probe: ProbeKind, target: &Target) -> Result<Box<dyn Closer>>;

    /// Tables exposed by the loaded bundle.
    fn tables(&mut self) -> Result<Tables>;
}

pub struct LocalLoader<I> {
    instrumentation: I,
}

impl<I: Instrumentation> LocalLoader<I> {
    pub fn new(instrumentation: I) -> Self {
        Self { instrumentation }
    }
}

#[async_trait]
impl<I: Instrumentation> Backend for LocalLoader<I> {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn acquire(self, target: &Target) -> Result<Acquired> {
        let mut instrumentation = self.instrumentation;
        let mut closers = CloserRegistry::new();

        let result = acquire_steps(&mut instrumentation, target, &mut closers);
        // The instrumentation may still reference the bundle; let go of it
        // before anything is released.
        drop(instrumentation);

        match result {
            Ok(tables) => Ok(Acquired { tables, closers }),
            Err(e) => {
                warn!("Local setup failed, releasing {} resources", closers.len());
                closers.release_all().await;
                Err(e)
            }
        }
    }
}

fn acquire_steps<I: Instrumentation>(
    instrumentation: &mut I,
    target: &Target,
    closers: &mut CloserRegistry,
) -> Result<Tables> {
    // Needed on kernels older than 5.11 (no memcg accounting).
    instrumentation.remove_memlock_limit()?;

    closers.push(instrumentation.load_bundle()?);

    instrumentation.open_target(target)?;

    for probe in ProbeKind::ALL {
        closers.push(instrumentation.attach(probe, target)?);
        info!("Attached {} to {}", probe, target);
    }

    instrumentation.tables()
}
