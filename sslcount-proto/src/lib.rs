//! gRPC protocol definitions for the bpfman agent
//!
//! Only the subset sslcount needs:
//! - `Bpfman.Load` / `Bpfman.Unload`
//! - uprobe attach info and bytecode location messages
//!
//! Generated from `proto/bpfman.proto`.

pub mod v1 {
    tonic::include_proto!("bpfman.v1");
}

pub use v1::bpfman_client::BpfmanClient;
pub use v1::bpfman_server::{Bpfman, BpfmanServer};
pub use v1::*;

/// Program type number of kprobe programs; uprobes are loaded as kprobes.
pub const PROGRAM_TYPE_KPROBE: u32 = 2;

/// Image pull policies understood by the agent.
pub mod image_pull_policy {
    pub const ALWAYS: i32 = 0;
    pub const IF_NOT_PRESENT: i32 = 1;
    pub const NEVER: i32 = 2;
}
