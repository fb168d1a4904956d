//! Names and layouts shared between the eBPF probes (kernel) and userspace
//!
//! Everything here must stay `no_std` compatible: the probes crate links this
//! crate with default features disabled.

#![cfg_attr(not(feature = "userspace"), no_std)]

/// Logical name of the per-process counting table.
///
/// The probes declare the map under this exact name so that both the local
/// loader (`Ebpf::take_map`) and the agent's pin directory use it.
pub const TABLE_NAME: &str = "rcount";

/// Maximum number of distinct processes tracked by the counting table.
///
/// Keys are process ids, so this is sized like a pid-keyed table rather than
/// a handful of slots.
pub const TABLE_MAX_ENTRIES: u32 = 10240;

/// Program attached on entry to the target symbol.
pub const ENTRY_PROGRAM: &str = "entry_ssl_read";

/// Program attached on return from the target symbol.
pub const RETURN_PROGRAM: &str = "ret_ssl_read";

/// Library instrumented when no executable is configured.
pub const DEFAULT_EXECUTABLE: &str = "/lib/x86_64-linux-gnu/libssl.so.3";

/// Symbol instrumented when none is configured.
pub const DEFAULT_SYMBOL: &str = "SSL_read";

/// Counting table key: thread-group id of the calling process.
pub type TableKey = u32;

/// Counting table value: number of observed probe hits for the key.
pub type TableValue = u32;

#[cfg(feature = "userspace")]
const _: () = {
    assert!(
        core::mem::size_of::<TableKey>() == 4,
        "table keys must be 32-bit"
    );
    assert!(
        core::mem::size_of::<TableValue>() == 4,
        "table values must be 32-bit"
    );
};
