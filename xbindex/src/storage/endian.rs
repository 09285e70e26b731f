//! Little-endian field access for on-disk structures.
//!
//! Both index formats store every integer and double in little-endian
//! order. `from_le_bytes`/`to_le_bytes` do the host conversion, so no
//! runtime endianness check is needed.
//!
//! All functions index the slice directly and panic when the field runs
//! past its end; callers size their buffers from the format layout.

#![allow(clippy::missing_const_for_fn)]

fn array<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

#[must_use]
pub fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(array(buf, at))
}

#[must_use]
pub fn get_i16(buf: &[u8], at: usize) -> i16 {
    i16::from_le_bytes(array(buf, at))
}

#[must_use]
pub fn get_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(array(buf, at))
}

#[must_use]
pub fn get_f64(buf: &[u8], at: usize) -> f64 {
    f64::from_le_bytes(array(buf, at))
}

pub fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_i16(buf: &mut [u8], at: usize, value: i16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_f64(buf: &mut [u8], at: usize, value: f64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}
