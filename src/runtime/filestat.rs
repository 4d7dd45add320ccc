//! Fixed-layout WASI records and the codec that moves them in and out of
//! guest memory.
//!
//! The two `filestat` layouts below are the one place where the legacy
//! (`wasi_unstable`) and modern (`wasi_snapshot_preview1`) ABI generations
//! disagree on the shape of a record: the modern one widened the link count
//! to 64 bits, which pushed every later field and grew the struct from 56 to
//! 64 bytes. Field widths and padding are part of the wire contract and must
//! match byte-for-byte, hence the explicit padding fields and the size
//! assertions.

use std::mem;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("struct size mismatch: expected {expected} byte(s), got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// `filestat` as written by `wasi_snapshot_preview1`. 64 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct FilestatModern {
    pub dev: u64,
    pub ino: u64,
    pub filetype: u8,
    pub pad0: [u8; 7],
    pub nlink: u64,
    pub size: u64,
    pub atim: u64,
    pub mtim: u64,
    pub ctim: u64,
}

/// `filestat` as expected by `wasi_unstable` callers. 56 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct FilestatLegacy {
    pub dev: u64,
    pub ino: u64,
    pub filetype: u8,
    pub pad0: [u8; 3],
    pub nlink: u32,
    pub size: u64,
    pub atim: u64,
    pub mtim: u64,
    pub ctim: u64,
}

pub const MODERN_FILESTAT_SIZE: usize = mem::size_of::<FilestatModern>();
pub const LEGACY_FILESTAT_SIZE: usize = mem::size_of::<FilestatLegacy>();

const _: () = assert!(MODERN_FILESTAT_SIZE == 64);
const _: () = assert!(LEGACY_FILESTAT_SIZE == 56);

impl FilestatLegacy {
    /// Reinterprets a modern record as its legacy layout.
    ///
    /// Every shared field carries over unchanged. The legacy link count is
    /// half as wide; values that do not fit saturate at `u32::MAX` rather
    /// than wrapping.
    pub fn from_modern(stat: &FilestatModern) -> Self {
        Self {
            dev: stat.dev,
            ino: stat.ino,
            filetype: stat.filetype,
            pad0: [0; 3],
            nlink: u32::try_from(stat.nlink).unwrap_or(u32::MAX),
            size: stat.size,
            atim: stat.atim,
            mtim: stat.mtim,
            ctim: stat.ctim,
        }
    }
}

/// Decodes a fixed-layout record from exactly `size_of::<T>()` bytes.
///
/// Guest memory offsets carry no alignment guarantee, so this always reads
/// unaligned. Multi-byte fields are little-endian, wasm's byte order.
pub fn decode_struct<T: Pod>(bytes: &[u8]) -> Result<T, CodecError> {
    bytemuck::try_pod_read_unaligned(bytes).map_err(|_| CodecError::SizeMismatch {
        expected: mem::size_of::<T>(),
        actual: bytes.len(),
    })
}

/// Encodes a fixed-layout record into exactly `size_of::<T>()` bytes.
pub fn encode_struct_into<T: Pod>(value: &T, out: &mut [u8]) -> Result<(), CodecError> {
    if out.len() != mem::size_of::<T>() {
        return Err(CodecError::SizeMismatch {
            expected: mem::size_of::<T>(),
            actual: out.len(),
        });
    }
    out.copy_from_slice(bytemuck::bytes_of(value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn layouts_match_the_wire_contract() {
        assert_eq!(offset_of!(FilestatModern, dev), 0);
        assert_eq!(offset_of!(FilestatModern, ino), 8);
        assert_eq!(offset_of!(FilestatModern, filetype), 16);
        assert_eq!(offset_of!(FilestatModern, nlink), 24);
        assert_eq!(offset_of!(FilestatModern, size), 32);
        assert_eq!(offset_of!(FilestatModern, atim), 40);
        assert_eq!(offset_of!(FilestatModern, mtim), 48);
        assert_eq!(offset_of!(FilestatModern, ctim), 56);

        assert_eq!(offset_of!(FilestatLegacy, dev), 0);
        assert_eq!(offset_of!(FilestatLegacy, ino), 8);
        assert_eq!(offset_of!(FilestatLegacy, filetype), 16);
        assert_eq!(offset_of!(FilestatLegacy, nlink), 20);
        assert_eq!(offset_of!(FilestatLegacy, size), 24);
        assert_eq!(offset_of!(FilestatLegacy, atim), 32);
        assert_eq!(offset_of!(FilestatLegacy, mtim), 40);
        assert_eq!(offset_of!(FilestatLegacy, ctim), 48);
    }

    #[test]
    fn codec_round_trip_is_byte_exact() {
        let stat = FilestatModern {
            dev: 0x0102_0304_0506_0708,
            ino: 42,
            filetype: 4,
            pad0: [0; 7],
            nlink: 3,
            size: 65536,
            atim: 1,
            mtim: 2,
            ctim: 3,
        };

        let mut bytes = [0u8; MODERN_FILESTAT_SIZE];
        encode_struct_into(&stat, &mut bytes).unwrap();
        // Spot-check the little-endian encoding of the first field.
        assert_eq!(&bytes[..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(decode_struct::<FilestatModern>(&bytes).unwrap(), stat);
    }

    #[test]
    fn decode_is_unaligned_safe() {
        let mut backing = [0u8; MODERN_FILESTAT_SIZE + 1];
        backing[1] = 7;
        let stat = decode_struct::<FilestatModern>(&backing[1..]).unwrap();
        assert_eq!(stat.dev, 7);
    }

    #[test]
    fn wrong_buffer_length_is_a_size_mismatch() {
        let short = [0u8; LEGACY_FILESTAT_SIZE];
        assert_eq!(
            decode_struct::<FilestatModern>(&short),
            Err(CodecError::SizeMismatch {
                expected: 64,
                actual: 56
            })
        );

        let stat = FilestatLegacy::zeroed();
        let mut long = [0u8; MODERN_FILESTAT_SIZE];
        assert_eq!(
            encode_struct_into(&stat, &mut long),
            Err(CodecError::SizeMismatch {
                expected: 56,
                actual: 64
            })
        );
    }

    #[test]
    fn shared_fields_survive_reinterpretation() {
        let modern = FilestatModern {
            dev: 11,
            ino: 22,
            filetype: 3,
            pad0: [0xFF; 7],
            nlink: 44,
            size: 55,
            atim: 66,
            mtim: 77,
            ctim: 88,
        };

        let legacy = FilestatLegacy::from_modern(&modern);
        assert_eq!(legacy.dev, 11);
        assert_eq!(legacy.ino, 22);
        assert_eq!(legacy.filetype, 3);
        assert_eq!(legacy.nlink, 44);
        assert_eq!(legacy.size, 55);
        assert_eq!(legacy.atim, 66);
        assert_eq!(legacy.mtim, 77);
        assert_eq!(legacy.ctim, 88);
        // Reserved bytes are never semantic data.
        assert_eq!(legacy.pad0, [0; 3]);
    }

    #[test]
    fn oversized_link_count_saturates() {
        let mut modern = FilestatModern::zeroed();
        modern.nlink = u64::from(u32::MAX) + 5;
        assert_eq!(FilestatLegacy::from_modern(&modern).nlink, u32::MAX);

        modern.nlink = u64::from(u32::MAX);
        assert_eq!(FilestatLegacy::from_modern(&modern).nlink, u32::MAX);
    }
}
