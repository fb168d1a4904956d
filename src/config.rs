//! Runtime settings: optional YAML file, overridden by command-line flags

use crate::target::Target;
use crate::{Result, SslcountError};
use serde::Deserialize;
use sslcount_common::{DEFAULT_EXECUTABLE, DEFAULT_SYMBOL};
use sslcount_proto::image_pull_policy;
use std::fmt;
use std::path::{Path, PathBuf};

/// bpfman's default control socket.
pub const DEFAULT_AGENT_ENDPOINT: &str = "unix:/run/bpfman-sock/bpfman.sock";

/// File name the embedded probe object is written under for the agent.
pub const EMBEDDED_BYTECODE_FILE: &str = "sslcount_bpfel.o";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Executable or shared library to instrument.
    pub executable: Option<PathBuf>,
    /// Symbol inside `executable`.
    pub symbol: Option<String>,
    /// Agent endpoint, `unix:<path>` or `http(s)://host:port`.
    pub agent: Option<String>,
    /// Local bytecode file for the agent.
    pub bytecode_file: Option<PathBuf>,
    /// OCI image holding the bytecode; takes precedence over `bytecode_file`.
    pub bytecode_image: Option<String>,
    /// When the agent pulls `bytecode_image`.
    pub image_pull_policy: Option<PullPolicy>,
}

impl Settings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| SslcountError::ConfigError(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SslcountError::ConfigError(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Values set in `overrides` replace the ones in `self`.
    ///
    /// The bytecode file and image are one choice: if `overrides` names
    /// either, both come from `overrides`.
    pub fn merge(self, overrides: Settings) -> Settings {
        let (bytecode_file, bytecode_image) =
            if overrides.bytecode_file.is_some() || overrides.bytecode_image.is_some() {
                (overrides.bytecode_file, overrides.bytecode_image)
            } else {
                (self.bytecode_file, self.bytecode_image)
            };

        Settings {
            executable: overrides.executable.or(self.executable),
            symbol: overrides.symbol.or(self.symbol),
            agent: overrides.agent.or(self.agent),
            bytecode_file,
            bytecode_image,
            image_pull_policy: overrides.image_pull_policy.or(self.image_pull_policy),
        }
    }

    pub fn target(&self) -> Target {
        Target::new(
            self.executable
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE)),
            self.symbol.as_deref().unwrap_or(DEFAULT_SYMBOL),
        )
    }

    pub fn agent_endpoint(&self) -> Result<AgentEndpoint> {
        self.agent
            .as_deref()
            .unwrap_or(DEFAULT_AGENT_ENDPOINT)
            .parse()
    }

    pub fn bytecode(&self) -> BytecodeSource {
        match (&self.bytecode_image, &self.bytecode_file) {
            (Some(url), _) => BytecodeSource::Image {
                url: url.clone(),
                pull_policy: self.image_pull_policy.unwrap_or_default(),
            },
            (None, Some(file)) => BytecodeSource::File(file.clone()),
            (None, None) => BytecodeSource::Embedded,
        }
    }
}

/// Where the agent loads the probe bytecode from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BytecodeSource {
    File(PathBuf),
    Image { url: String, pull_policy: PullPolicy },
    /// The probe object compiled into this binary.
    Embedded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
pub enum PullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

impl PullPolicy {
    /// Wire value in `BytecodeImage.image_pull_policy`.
    pub fn as_proto(self) -> i32 {
        match self {
            PullPolicy::Always => image_pull_policy::ALWAYS,
            PullPolicy::IfNotPresent => image_pull_policy::IF_NOT_PRESENT,
            PullPolicy::Never => image_pull_policy::NEVER,
        }
    }
}

/// Address of the agent's control endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEndpoint {
    Unix(PathBuf),
    Http(String),
}

impl std::str::FromStr for AgentEndpoint {
    type Err = SslcountError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(SslcountError::ConfigError(
                    "unix agent endpoint needs a socket path".to_string(),
                ));
            }
            return Ok(AgentEndpoint::Unix(PathBuf::from(path)));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(AgentEndpoint::Http(s.to_string()));
        }
        Err(SslcountError::ConfigError(format!(
            "unsupported agent endpoint {:?} (expected unix:<path> or http(s)://host:port)",
            s
        )))
    }
}

impl fmt::Display for AgentEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentEndpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            AgentEndpoint::Http(uri) => write!(f, "{}", uri),
        }
    }
}
