//! aya-backed instrumentation: probe bundle, uprobe links and pinned tables

use super::delegated::PinnedTableOpener;
use super::local::Instrumentation;
use crate::closer::Closer;
use crate::table::{CountingTable, Tables};
use crate::target::{ProbeKind, Target};
use crate::{Result, SslcountError};
use async_trait::async_trait;
use aya::maps::{HashMap, Map, MapData};
use aya::programs::links::Link;
use aya::programs::uprobe::UProbeLink;
use aya::programs::UProbe;
use aya::Ebpf;
use aya_log::EbpfLogger;
use sslcount_common::{TableKey, TableValue, TABLE_NAME};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

type SharedBundle = Arc<Mutex<Ebpf>>;

/// Probe object compiled by build.rs. Empty when the eBPF toolchain was not
/// available at build time.
pub fn embedded_object() -> &'static [u8] {
    aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/sslcount"))
}

/// Local kernel instrumentation through aya.
pub struct AyaInstrumentation {
    object: &'static [u8],
    bundle: Option<SharedBundle>,
    executable: Option<PathBuf>,
}

impl AyaInstrumentation {
    /// Use the probe object compiled by build.rs.
    pub fn embedded() -> Self {
        Self {
            object: embedded_object(),
            bundle: None,
            executable: None,
        }
    }

    fn bundle(&self) -> Result<MutexGuard<'_, Ebpf>> {
        self.bundle
            .as_ref()
            .ok_or_else(|| SslcountError::ProgramLoadFailed("program bundle not loaded".into()))?
            .lock()
            .map_err(|_| SslcountError::ProgramLoadFailed("program bundle lock poisoned".into()))
    }
}

impl Instrumentation for AyaInstrumentation {
    fn remove_memlock_limit(&mut self) -> Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: libc::RLIM_INFINITY,
            rlim_max: libc::RLIM_INFINITY,
        };
        // SAFETY: setrlimit only reads the struct passed by reference.
        let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
        if ret != 0 {
            return Err(SslcountError::MemlockLimit(std::io::Error::last_os_error()));
        }
        debug!("Removed locked memory limit");
        Ok(())
    }

    fn load_bundle(&mut self) -> Result<Box<dyn Closer>> {
        if self.object.is_empty() {
            return Err(SslcountError::ProgramLoadFailed(
                "probe object was not compiled into this binary (bpf-linker missing at build time)"
                    .into(),
            ));
        }

        let mut bpf = Ebpf::load(self.object)
            .map_err(|e| SslcountError::ProgramLoadFailed(e.to_string()))?;

        if let Err(e) = EbpfLogger::init(&mut bpf) {
            warn!(
                "Failed to initialize EbpfLogger: {}. eBPF probe logs will not be visible.",
                e
            );
        }

        for probe in ProbeKind::ALL {
            let name = probe.program_name();
            let program: &mut UProbe = bpf
                .program_mut(name)
                .ok_or_else(|| {
                    SslcountError::ProgramLoadFailed(format!("{} not found in eBPF object", name))
                })?
                .try_into()
                .map_err(|e| SslcountError::ProgramLoadFailed(format!("{}: {}", name, e)))?;

            if let Err(e) = program.load() {
                error!("Verifier rejected {}: {:?}", name, e);
                return Err(SslcountError::ProgramLoadFailed(format!("{}: {}", name, e)));
            }
        }

        info!("Loaded eBPF program bundle");
        let bundle = Arc::new(Mutex::new(bpf));
        self.bundle = Some(Arc::clone(&bundle));
        Ok(Box::new(BundleCloser { bundle }))
    }

    fn open_target(&mut self, target: &Target) -> Result<()> {
        let path = target.executable();
        let resolved = path
            .canonicalize()
            .ok()
            .filter(|p| p.is_file())
            .ok_or_else(|| SslcountError::TargetNotFound {
                path: path.display().to_string(),
            })?;

        debug!("Opened executable {}", resolved.display());
        self.executable = Some(resolved);
        Ok(())
    }

    fn attach(&mut self, probe: ProbeKind, target: &Target) -> Result<Box<dyn Closer>> {
        let executable = self
            .executable
            .clone()
            .ok_or_else(|| SslcountError::AttachFailed("target executable not opened".into()))?;
        let name = probe.program_name();

        let mut bpf = self.bundle()?;
        let program: &mut UProbe = bpf
            .program_mut(name)
            .ok_or_else(|| SslcountError::AttachFailed(format!("{} not found", name)))?
            .try_into()
            .map_err(|e| SslcountError::AttachFailed(format!("{}: {}", name, e)))?;

        let link_id = program
            .attach(Some(target.symbol()), 0, &executable, None)
            .map_err(|e| SslcountError::AttachFailed(format!("{} {}: {}", probe, target, e)))?;
        let link = program
            .take_link(link_id)
            .map_err(|e| SslcountError::AttachFailed(format!("{}: {}", name, e)))?;

        Ok(Box::new(LinkCloser { probe, link }))
    }

    fn tables(&mut self) -> Result<Tables> {
        let map = self
            .bundle()?
            .take_map(TABLE_NAME)
            .ok_or_else(|| SslcountError::TableNotFound(TABLE_NAME.to_string()))?;
        // Tables hold their own map fd; the bundle stays with its closer.
        self.bundle = None;

        let table = counting_table(map)?;
        let mut tables = Tables::new();
        tables.insert(TABLE_NAME.to_string(), table);
        Ok(tables)
    }
}

fn counting_table(map: Map) -> Result<Box<dyn CountingTable>> {
    let table: HashMap<MapData, TableKey, TableValue> = HashMap::try_from(map)
        .map_err(|e| SslcountError::TableNotFound(format!("{}: {}", TABLE_NAME, e)))?;
    Ok(Box::new(table))
}

/// Owns the loaded bundle; releasing it unloads programs and maps.
struct BundleCloser {
    bundle: SharedBundle,
}

#[async_trait]
impl Closer for BundleCloser {
    fn describe(&self) -> String {
        "eBPF program bundle".to_string()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        match Arc::try_unwrap(self.bundle) {
            Ok(bundle) => {
                drop(bundle);
                Ok(())
            }
            Err(_) => Err(SslcountError::CloseFailed {
                resource: "eBPF program bundle".to_string(),
                reason: "bundle is still referenced".to_string(),
            }),
        }
    }
}

/// One attached uprobe; releasing it detaches the probe.
struct LinkCloser {
    probe: ProbeKind,
    link: UProbeLink,
}

#[async_trait]
impl Closer for LinkCloser {
    fn describe(&self) -> String {
        format!("{} link", self.probe)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let probe = self.probe;
        self.link.detach().map_err(|e| SslcountError::CloseFailed {
            resource: format!("{} link", probe),
            reason: e.to_string(),
        })
    }
}

/// Opens tables the agent pinned on bpffs.
pub struct PinnedMapOpener;

impl PinnedTableOpener for PinnedMapOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn CountingTable>> {
        let data = MapData::from_pin(path).map_err(|e| {
            SslcountError::TableNotFound(format!("pinned map {}: {}", path.display(), e))
        })?;
        counting_table(Map::HashMap(data))
    }
}
