//! eBPF probes for sslcount
//!
//! Contains the entry and return uprobes for the instrumented read symbol and
//! the `rcount` table they update. Counts are keyed by the calling process.
//!
//! eBPF program implementations are in src/bin/. This library half stays
//! empty so the crate can be a build-dependency of the host binary.

#![no_std]
