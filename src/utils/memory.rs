use anyhow::Context;

/// Bounds-checked byte access over the guest's linear memory.
///
/// The backing buffer may be reallocated whenever the guest grows its memory,
/// so callers must re-derive the byte view from the store on every host call
/// rather than caching it.
pub trait MemoryExt {
    fn read_bytes(&self, addr: usize, len: usize) -> anyhow::Result<&[u8]>;

    fn write_bytes(&mut self, addr: usize, len: usize) -> anyhow::Result<&mut [u8]>;

    fn read_array<const N: usize>(&self, addr: usize) -> anyhow::Result<[u8; N]>;
}

impl MemoryExt for [u8] {
    fn read_bytes(&self, addr: usize, len: usize) -> anyhow::Result<&[u8]> {
        self.get(addr..)
            .context("memory base address too large")?
            .get(..len)
            .context("read past bounds of memory")
    }

    fn write_bytes(&mut self, addr: usize, len: usize) -> anyhow::Result<&mut [u8]> {
        self.get_mut(addr..)
            .context("memory base address too large")?
            .get_mut(..len)
            .context("write past bounds of memory")
    }

    fn read_array<const N: usize>(&self, addr: usize) -> anyhow::Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(addr, N)?);
        Ok(out)
    }
}

/// Looks up the guest's exported linear memory from within a host call.
pub fn guest_memory<T>(caller: &mut wasmtime::Caller<'_, T>) -> anyhow::Result<wasmtime::Memory> {
    caller
        .get_export("memory")
        .and_then(wasmtime::Extern::into_memory)
        .context("guest does not export its linear memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_bounds_reads_and_writes() {
        let mut mem = vec![0u8; 16];
        mem[4..8].copy_from_slice(&[1, 2, 3, 4]);

        assert_eq!(mem.read_bytes(4, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(mem.read_array::<2>(5).unwrap(), [2, 3]);

        mem.write_bytes(12, 4).unwrap().copy_from_slice(&[9; 4]);
        assert_eq!(&mem[12..], &[9; 4]);
    }

    #[test]
    fn out_of_bounds_access_fails() {
        let mut mem = vec![0u8; 16];
        assert!(mem.read_bytes(17, 1).is_err());
        assert!(mem.read_bytes(8, 9).is_err());
        assert!(mem.write_bytes(16, 1).is_err());
        assert!(mem.read_array::<4>(14).is_err());
    }
}
