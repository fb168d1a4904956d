//! Entry/return uprobes that count read calls per process
//!
//! This binary must be built for the bpfel-unknown-none target. The root
//! crate's build.rs handles the cross-compilation through aya-build.
//!
//! Both programs share one hash table:
//! - the entry probe inserts a new key with count 1 or increments it
//! - the return probe only increments keys the entry probe created

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::{BPF_EXIST, BPF_NOEXIST},
    macros::{map, uprobe, uretprobe},
    maps::HashMap,
    programs::{ProbeContext, RetProbeContext},
    EbpfContext,
};
use aya_log_ebpf::{debug, error};
use sslcount_common::{TableKey, TableValue, TABLE_MAX_ENTRIES};

#[map(name = "rcount")]
static RCOUNT: HashMap<TableKey, TableValue> = HashMap::with_max_entries(TABLE_MAX_ENTRIES, 0);

#[uprobe]
pub fn entry_ssl_read(ctx: ProbeContext) -> u32 {
    let tgid = ctx.tgid();
    debug!(&ctx, "uprobe/SSL_read tgid={}", tgid);
    if let Err(ret) = count(tgid, false) {
        error!(&ctx, "rcount update failed for tgid={}: {}", tgid, ret);
    }
    0
}

#[uretprobe]
pub fn ret_ssl_read(ctx: RetProbeContext) -> u32 {
    debug!(&ctx, "uretprobe/SSL_read tgid={}", ctx.tgid());
    if count(ctx.tgid(), true).is_err() {
        debug!(&ctx, "no entry recorded for tgid={}", ctx.tgid());
    }
    0
}

fn count(key: TableKey, is_return: bool) -> Result<(), i64> {
    match RCOUNT.get_ptr_mut(&key) {
        Some(value) => {
            // SAFETY: the pointer comes from a successful map lookup and stays
            // valid for the duration of this program invocation.
            let next = unsafe { (*value).wrapping_add(1) };
            RCOUNT.insert(&key, &next, BPF_EXIST as u64)
        }
        None if !is_return => RCOUNT.insert(&key, &1, BPF_NOEXIST as u64),
        None => Err(1),
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
