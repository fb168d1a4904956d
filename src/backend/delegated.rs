//! Delegated loader: a bpfman agent loads and attaches the probes
//!
//! The entry program is loaded first and owns the map set; the return
//! program is loaded with `map_owner_id` set to the entry program's id so
//! both update the same table. Only the owner's pinned table is opened.

use super::{Acquired, Backend};
use crate::closer::{Closer, CloserRegistry};
use crate::config::{BytecodeSource, EMBEDDED_BYTECODE_FILE};
use crate::table::{CountingTable, Tables};
use crate::target::{ProbeKind, Target};
use crate::{Result, SslcountError};
use async_trait::async_trait;
use sslcount_common::TABLE_NAME;
use sslcount_proto::{
    attach_info, bytecode_location, AttachInfo, BytecodeImage,
    BytecodeLocation, LoadRequest, LoadResponse, ProgramInfo, UprobeAttachInfo,
    PROGRAM_TYPE_KPROBE,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the container process whose namespace the
/// probes are attached in.
pub const HOST_PID_ENV: &str = "UPROBE_HOST_PID";

/// RPC surface of the agent.
#[async_trait]
pub trait AgentClient: Clone + Send + Sync + 'static {
    async fn load(&self, request: LoadRequest) -> std::result::Result<LoadResponse, tonic::Status>;

    async fn unload(&self, id: u32) -> std::result::Result<(), tonic::Status>;
}

/// Opens the control connection to the agent.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    type Client: AgentClient;

    /// Returns a client plus the closer for the underlying connection.
    async fn connect(&self) -> Result<(Self::Client, Box<dyn Closer>)>;
}

/// Opens a table pinned on the local filesystem.
pub trait PinnedTableOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn CountingTable>>;
}

pub struct DelegatedLoader<C, O> {
    connector: C,
    opener: O,
    bytecode: BytecodeSource,
    embedded: &'static [u8],
    scratch_dir: PathBuf,
    host_pid: Option<String>,
}

impl<C: AgentConnector, O: PinnedTableOpener> DelegatedLoader<C, O> {
    /// Captures the raw `UPROBE_HOST_PID` value now; it is validated when
    /// acquiring.
    pub fn new(connector: C, opener: O, bytecode: BytecodeSource) -> Self {
        Self {
            connector,
            opener,
            bytecode,
            embedded: &[],
            scratch_dir: std::env::temp_dir().join("sslcount"),
            host_pid: std::env::var(HOST_PID_ENV).ok(),
        }
    }

    /// Probe object handed to the agent for [`BytecodeSource::Embedded`].
    pub fn with_embedded_object(mut self, object: &'static [u8]) -> Self {
        self.embedded = object;
        self
    }

    /// Directory the embedded object is written to for the agent to read.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Override the raw `UPROBE_HOST_PID` value.
    pub fn with_host_pid(mut self, host_pid: Option<String>) -> Self {
        self.host_pid = host_pid;
        self
    }

    async fn acquire_steps(&self, target: &Target, closers: &mut CloserRegistry) -> Result<Tables> {
        let container_pid = parse_host_pid(self.host_pid.as_deref())?;
        match container_pid {
            Some(pid) => info!("Attaching inside the namespace of process {}", pid),
            None => info!(
                "{} is not set. Will not attempt to attach probes to another container.",
                HOST_PID_ENV
            ),
        }

        let bytecode = resolve_bytecode(&self.bytecode, self.embedded, &self.scratch_dir)?;

        let (client, connection) = self.connector.connect().await?;
        closers.push(connection);

        let mut tables = Tables::new();
        let mut map_owner_id = None;

        for probe in ProbeKind::ALL {
            let mut request = load_request(&bytecode, probe, target, container_pid);
            request.map_owner_id = map_owner_id;

            let response =
                client
                    .load(request)
                    .await
                    .map_err(|status| SslcountError::AgentRequest {
                        operation: format!("load {}", probe.program_name()),
                        reason: status.message().to_string(),
                    })?;

            let id = response
                .kernel_info
                .as_ref()
                .map(|kernel| kernel.id)
                .ok_or(SslcountError::MissingResponseField {
                    field: "kernel_info",
                    message: "LoadResponse",
                })?;
            closers.push(Box::new(RemoteProgram::new(
                client.clone(),
                id,
                probe.program_name(),
            )));

            let program = response.info.ok_or(SslcountError::MissingResponseField {
                field: "info",
                message: "LoadResponse",
            })?;
            info!("program {} loaded! id: {}", program.name, id);

            let path = pin_path(&program, TABLE_NAME)?;
            if map_owner_id.is_none() {
                tables.insert(TABLE_NAME.to_string(), self.opener.open(&path)?);
                map_owner_id = Some(id);
            }
            info!("maps:");
            info!(" - {}: {}", TABLE_NAME, path.display());
        }

        Ok(tables)
    }
}

#[async_trait]
impl<C: AgentConnector, O: PinnedTableOpener> Backend for DelegatedLoader<C, O> {
    fn name(&self) -> &'static str {
        "delegated"
    }

    async fn acquire(self, target: &Target) -> Result<Acquired> {
        let mut closers = CloserRegistry::new();

        match self.acquire_steps(target, &mut closers).await {
            Ok(tables) => Ok(Acquired { tables, closers }),
            Err(e) => {
                warn!(
                    "Delegated setup failed, releasing {} resources",
                    closers.len()
                );
                closers.release_all().await;
                Err(e)
            }
        }
    }
}

/// Parse the raw `UPROBE_HOST_PID` value. Absent means the local namespace.
pub fn parse_host_pid(raw: Option<&str>) -> Result<Option<i32>> {
    raw.map(|value| {
        value
            .trim()
            .parse::<i32>()
            .map_err(|e| SslcountError::InvalidHostPid {
                value: value.to_string(),
                reason: e.to_string(),
            })
    })
    .transpose()
}

/// Resolve where the agent should fetch the bytecode from.
///
/// A file path is made absolute and must exist. The embedded object is
/// written to `scratch_dir` and passed as a file.
pub fn resolve_bytecode(
    source: &BytecodeSource,
    embedded: &[u8],
    scratch_dir: &Path,
) -> Result<BytecodeLocation> {
    let location = match source {
        BytecodeSource::Image { url, pull_policy } => {
            bytecode_location::Location::Image(BytecodeImage {
                url: url.clone(),
                image_pull_policy: pull_policy.as_proto(),
                username: None,
                password: None,
            })
        }
        BytecodeSource::Embedded => {
            let path = write_embedded_object(embedded, scratch_dir)?;
            bytecode_location::Location::File(path.display().to_string())
        }
        BytecodeSource::File(path) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                std::env::current_dir()?.join(path)
            };
            if !path.is_file() {
                return Err(SslcountError::ConfigError(format!(
                    "bytecode file {} does not exist",
                    path.display()
                )));
            }
            bytecode_location::Location::File(path.display().to_string())
        }
    };

    Ok(BytecodeLocation {
        location: Some(location),
    })
}

fn write_embedded_object(object: &[u8], scratch_dir: &Path) -> Result<PathBuf> {
    if object.is_empty() {
        return Err(SslcountError::ConfigError(
            "no probe object was compiled into this binary; pass --file or --image".to_string(),
        ));
    }
    let dir = if scratch_dir.is_absolute() {
        scratch_dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(scratch_dir)
    };
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(EMBEDDED_BYTECODE_FILE);
    std::fs::write(&path, object)?;
    info!("Wrote embedded probe object to {}", path.display());
    Ok(path)
}

/// Build the load request for one probe.
pub fn load_request(
    bytecode: &BytecodeLocation,
    probe: ProbeKind,
    target: &Target,
    container_pid: Option<i32>,
) -> LoadRequest {
    LoadRequest {
        bytecode: Some(bytecode.clone()),
        name: probe.program_name().to_string(),
        program_type: PROGRAM_TYPE_KPROBE,
        attach: Some(AttachInfo {
            info: Some(attach_info::Info::UprobeAttachInfo(UprobeAttachInfo {
                fn_name: Some(target.symbol().to_string()),
                offset: 0,
                target: target.executable().display().to_string(),
                retprobe: probe.is_return(),
                pid: None,
                container_pid,
            })),
        }),
        ..Default::default()
    }
}

/// Path where the agent pinned `map_name` for `program`.
pub fn pin_path(program: &ProgramInfo, map_name: &str) -> Result<PathBuf> {
    if program.map_pin_path.is_empty() {
        return Err(SslcountError::PinPath(format!(
            "agent reported no map pin path for {}",
            program.name
        )));
    }
    Ok(Path::new(&program.map_pin_path).join(map_name))
}

/// A program loaded by the agent. Releasing it asks the agent to unload it.
pub struct RemoteProgram<A: AgentClient> {
    client: Option<A>,
    id: u32,
    name: String,
}

impl<A: AgentClient> RemoteProgram<A> {
    pub fn new(client: A, id: u32, name: &str) -> Self {
        Self {
            client: Some(client),
            id,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl<A: AgentClient> Closer for RemoteProgram<A> {
    fn describe(&self) -> String {
        format!("program {} ({})", self.id, self.name)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let Some(client) = this.client.take() else {
            return Ok(());
        };
        info!("unloading program: {}", this.id);
        client
            .unload(this.id)
            .await
            .map_err(|status| SslcountError::CloseFailed {
                resource: this.describe(),
                reason: status.message().to_string(),
            })
    }
}

impl<A: AgentClient> Drop for RemoteProgram<A> {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("program {} dropped without release, scheduling unload", id);
                handle.spawn(async move {
                    if let Err(status) = client.unload(id).await {
                        warn!("unload of program {} failed: {}", id, status.message());
                    }
                });
            }
            Err(_) => warn!("program {} dropped outside a runtime, left loaded", id),
        }
    }
}
