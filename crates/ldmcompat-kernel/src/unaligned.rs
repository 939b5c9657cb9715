//! Big-endian loads from byte buffers with no alignment requirement
//!
//! # Panics
//!
//! Each function panics if the slice is shorter than the integer width,
//! like any out-of-range slice index.

pub fn get_unaligned_be16(p: &[u8]) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&p[..2]);
    u16::from_be_bytes(b)
}

pub fn get_unaligned_be32(p: &[u8]) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&p[..4]);
    u32::from_be_bytes(b)
}

pub fn get_unaligned_be64(p: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&p[..8]);
    u64::from_be_bytes(b)
}
