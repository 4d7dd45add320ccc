//! `wasi_unstable` compatibility layer.
//!
//! Presents the legacy system-interface namespace while delegating the real
//! work to the `wasi_snapshot_preview1` functions already in the linker. Most
//! calls are identical between the two generations and pass through
//! untouched; the three that diverge are rewritten here:
//!
//! - `fd_seek`: the whence enumeration is permuted between generations.
//! - `fd_filestat_get` / `path_filestat_get`: the modern call writes a
//!   64-byte record where the legacy caller reserved 56 bytes, so the result
//!   must be re-encoded in place and the trailing 8 bytes of unrelated guest
//!   data put back afterwards.

use anyhow::Context;
use wasmtime::{Caller, Linker, Store, TypedFunc, WasmParams, WasmResults};

use crate::runtime::base::StoreState;
use crate::runtime::filestat::{
    decode_struct, encode_struct_into, FilestatLegacy, FilestatModern, LEGACY_FILESTAT_SIZE,
    MODERN_FILESTAT_SIZE,
};
use crate::utils::memory::{guest_memory, MemoryExt};

pub const MODERN_NS: &str = "wasi_snapshot_preview1";
pub const LEGACY_NS: &str = "wasi_unstable";

/// Bytes past the legacy record that the modern write clobbers.
pub const FILESTAT_TAIL: usize = MODERN_FILESTAT_SIZE - LEGACY_FILESTAT_SIZE;

/// Legacy whence values (cur, end, set) mapped onto the modern ordering
/// (set, cur, end). A permutation, not a formula.
const WHENCE_LEGACY_TO_MODERN: [i32; 3] = [1, 2, 0];

/// The calls the two generations disagree on; everything else is aliased.
const REWRITTEN: [&str; 3] = ["fd_seek", "fd_filestat_get", "path_filestat_get"];

pub fn remap_whence(whence: i32) -> anyhow::Result<i32> {
    usize::try_from(whence)
        .ok()
        .and_then(|w| WHENCE_LEGACY_TO_MODERN.get(w).copied())
        .with_context(|| format!("invalid whence: {whence}"))
}

/// Converts the modern record the delegated call left at `buf` into the
/// legacy layout the caller expects, in place.
fn rewrite_filestat(mem: &mut [u8], buf: usize) -> anyhow::Result<()> {
    let modern: FilestatModern = decode_struct(mem.read_bytes(buf, MODERN_FILESTAT_SIZE)?)?;
    let legacy = FilestatLegacy::from_modern(&modern);
    encode_struct_into(&legacy, mem.write_bytes(buf, LEGACY_FILESTAT_SIZE)?)?;
    Ok(())
}

/// Runs a modern filestat call on behalf of a legacy caller.
///
/// The modern call writes 64 bytes at `buf` but the legacy caller only owns
/// 56; bytes [buf+56, buf+64) belong to unrelated guest data. Those bytes are
/// snapshotted first and restored last, on every exit path — the restore is
/// attached to a scope guard so an error from the delegated call cannot skip
/// it.
fn filestat_shim(
    mut caller: Caller<'_, StoreState>,
    buf: i32,
    call: impl FnOnce(&mut Caller<'_, StoreState>) -> anyhow::Result<i32>,
) -> anyhow::Result<i32> {
    let memory = guest_memory(&mut caller)?;
    let buf = buf as u32 as usize;

    let backup: [u8; FILESTAT_TAIL] = memory
        .data(&caller)
        .read_array(buf + LEGACY_FILESTAT_SIZE)
        .context("filestat buffer out of bounds")?;

    // Restores the tail after the rewrite below, or immediately if the
    // delegated call fails. Guest memory only grows, so the range stays
    // valid.
    let mut caller = scopeguard::guard(caller, move |mut caller| {
        if let Ok(tail) = memory
            .data_mut(&mut caller)
            .write_bytes(buf + LEGACY_FILESTAT_SIZE, FILESTAT_TAIL)
        {
            tail.copy_from_slice(&backup);
        }
    });

    let errno = call(&mut caller)?;

    // The view must be re-derived: the call above may have grown memory.
    rewrite_filestat(memory.data_mut(&mut *caller), buf)?;

    Ok(errno)
}

fn modern_func<P: WasmParams, R: WasmResults>(
    linker: &Linker<StoreState>,
    store: &mut Store<StoreState>,
    name: &str,
) -> anyhow::Result<TypedFunc<P, R>> {
    linker
        .get(&mut *store, MODERN_NS, name)
        .and_then(wasmtime::Extern::into_func)
        .with_context(|| format!("{MODERN_NS} does not provide {name}"))?
        .typed(&*store)
        .with_context(|| format!("{MODERN_NS}.{name} has an unexpected signature"))
}

/// Populates the `wasi_unstable` namespace from the modern definitions
/// already present in `linker`, installing translated wrappers for the calls
/// the two ABI generations disagree on.
pub fn add_to_linker(
    linker: &mut Linker<StoreState>,
    store: &mut Store<StoreState>,
) -> anyhow::Result<()> {
    let aliased: Vec<(String, wasmtime::Extern)> = linker
        .iter(&mut *store)
        .filter(|(module, name, _)| *module == MODERN_NS && !REWRITTEN.contains(name))
        .map(|(_, name, item)| (name.to_string(), item))
        .collect();
    for (name, item) in aliased {
        linker.define(&mut *store, LEGACY_NS, &name, item)?;
    }

    let seek = modern_func::<(i32, i64, i32, i32), i32>(linker, store, "fd_seek")?;
    linker.func_wrap(
        LEGACY_NS,
        "fd_seek",
        move |mut caller: Caller<'_, StoreState>,
              fd: i32,
              offset: i64,
              whence: i32,
              result: i32|
              -> anyhow::Result<i32> {
            let whence = remap_whence(whence)?;
            seek.call(&mut caller, (fd, offset, whence, result))
        },
    )?;

    let fd_filestat = modern_func::<(i32, i32), i32>(linker, store, "fd_filestat_get")?;
    linker.func_wrap(
        LEGACY_NS,
        "fd_filestat_get",
        move |caller: Caller<'_, StoreState>, fd: i32, buf: i32| -> anyhow::Result<i32> {
            filestat_shim(caller, buf, |caller| fd_filestat.call(caller, (fd, buf)))
        },
    )?;

    let path_filestat = modern_func::<(i32, i32, i32, i32, i32), i32>(linker, store, "path_filestat_get")?;
    linker.func_wrap(
        LEGACY_NS,
        "path_filestat_get",
        move |caller: Caller<'_, StoreState>,
              fd: i32,
              flags: i32,
              path: i32,
              path_len: i32,
              buf: i32|
              -> anyhow::Result<i32> {
            filestat_shim(caller, buf, |caller| {
                path_filestat.call(caller, (fd, flags, path, path_len, buf))
            })
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whence_table_is_the_fixed_permutation() {
        assert_eq!(remap_whence(0).unwrap(), 1);
        assert_eq!(remap_whence(1).unwrap(), 2);
        assert_eq!(remap_whence(2).unwrap(), 0);
        assert!(remap_whence(3).is_err());
        assert!(remap_whence(-1).is_err());
    }

    /// Emulates the full transaction against a plain buffer: snapshot the
    /// tail, let the "modern call" scribble 64 bytes, rewrite, restore.
    #[test]
    fn rewrite_preserves_fields_and_restore_repairs_the_tail() {
        let buf = 16usize;
        let mut mem = vec![0u8; 128];

        // Unrelated guest data directly after the legacy record.
        let sentinel = *b"GUESTDAT";
        mem[buf + LEGACY_FILESTAT_SIZE..buf + MODERN_FILESTAT_SIZE].copy_from_slice(&sentinel);

        let backup: [u8; FILESTAT_TAIL] = mem.read_array(buf + LEGACY_FILESTAT_SIZE).unwrap();

        // The modern call overwrites all 64 bytes, sentinel included.
        let modern = FilestatModern {
            dev: 7,
            ino: 9,
            filetype: 4,
            pad0: [0; 7],
            nlink: u64::from(u32::MAX) + 2,
            size: 4096,
            atim: 111,
            mtim: 222,
            ctim: 333,
        };
        encode_struct_into(&modern, &mut mem[buf..buf + MODERN_FILESTAT_SIZE]).unwrap();

        rewrite_filestat(&mut mem, buf).unwrap();
        mem[buf + LEGACY_FILESTAT_SIZE..buf + MODERN_FILESTAT_SIZE].copy_from_slice(&backup);

        let legacy: FilestatLegacy =
            decode_struct(&mem[buf..buf + LEGACY_FILESTAT_SIZE]).unwrap();
        assert_eq!(legacy.dev, 7);
        assert_eq!(legacy.ino, 9);
        assert_eq!(legacy.filetype, 4);
        assert_eq!(legacy.nlink, u32::MAX);
        assert_eq!(legacy.size, 4096);
        assert_eq!((legacy.atim, legacy.mtim, legacy.ctim), (111, 222, 333));

        // The tail is byte-identical to its pre-call contents.
        assert_eq!(
            &mem[buf + LEGACY_FILESTAT_SIZE..buf + MODERN_FILESTAT_SIZE],
            &sentinel
        );
    }

    #[test]
    fn rewrite_rejects_an_out_of_bounds_buffer() {
        let mut mem = vec![0u8; MODERN_FILESTAT_SIZE];
        assert!(rewrite_filestat(&mut mem, 1).is_err());
        assert!(rewrite_filestat(&mut mem, 0).is_ok());
    }
}
