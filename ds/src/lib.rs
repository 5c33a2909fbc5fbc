//! Block device interface consumed by the esfat filesystem engine.
//!
//! A [`BlockDevice`] is the only thing the engine knows about the underlying
//! storage medium: a flat, byte-addressable space that can be read and
//! written at arbitrary offset and length. Sector-granularity chunking,
//! retries, and media-specific command sequencing (SD/SPI, USB mass storage,
//! ...) all live below this trait and are out of scope for this crate.

/// Reads and writes a flat byte-addressable device.
///
/// Implementations are trusted: the engine performs no retries and assumes
/// that a short transfer means the device has no more to give (end of
/// medium, I/O error, etc), not a transient condition worth retrying.
pub trait BlockDevice {
    /// Reads up to `buf.len()` bytes starting at `byte_offset`.
    ///
    /// Returns the number of bytes actually transferred, which may be less
    /// than `buf.len()`.
    fn read(&self, byte_offset: u64, buf: &mut [u8]) -> usize;

    /// Writes up to `buf.len()` bytes starting at `byte_offset`.
    ///
    /// Returns the number of bytes actually transferred, which may be less
    /// than `buf.len()`.
    fn write(&self, byte_offset: u64, buf: &[u8]) -> usize;
}
