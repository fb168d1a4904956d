//! Target descriptor and the two probe kinds attached to it

use sslcount_common::{DEFAULT_EXECUTABLE, DEFAULT_SYMBOL, ENTRY_PROGRAM, RETURN_PROGRAM};
use std::fmt;
use std::path::{Path, PathBuf};

/// What is being instrumented: one symbol inside one executable image.
///
/// Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    executable: PathBuf,
    symbol: String,
}

impl Target {
    pub fn new(executable: impl Into<PathBuf>, symbol: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            symbol: symbol.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new(DEFAULT_EXECUTABLE, DEFAULT_SYMBOL)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.executable.display(), self.symbol)
    }
}

/// Entry and return probes share a target but are separate attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Entry,
    Return,
}

impl ProbeKind {
    /// Attachment order: entry first, then return.
    pub const ALL: [ProbeKind; 2] = [ProbeKind::Entry, ProbeKind::Return];

    pub const fn program_name(&self) -> &'static str {
        match self {
            ProbeKind::Entry => ENTRY_PROGRAM,
            ProbeKind::Return => RETURN_PROGRAM,
        }
    }

    pub const fn is_return(&self) -> bool {
        matches!(self, ProbeKind::Return)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Entry => "uprobe",
            ProbeKind::Return => "uretprobe",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target() {
        let target = Target::default();
        assert_eq!(target.symbol(), "SSL_read");
        assert_eq!(
            target.to_string(),
            "/lib/x86_64-linux-gnu/libssl.so.3:SSL_read"
        );
    }

    #[test]
    fn test_probe_order_and_names() {
        assert_eq!(ProbeKind::ALL[0].program_name(), "entry_ssl_read");
        assert_eq!(ProbeKind::ALL[1].program_name(), "ret_ssl_read");
        assert!(!ProbeKind::Entry.is_return());
        assert!(ProbeKind::Return.is_return());
    }
}
