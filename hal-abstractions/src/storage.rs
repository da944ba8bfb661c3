//! Persistent configuration storage

/// A single small record in flash (one file on SPIFFS, one key in NVS, ...)
///
/// The record is opaque bytes here; the core crate owns its format.
pub trait ConfigStorage {
    type Error: core::fmt::Debug;

    /// Whether a record has been written since the last [`remove`](Self::remove)
    fn exists(&mut self) -> Result<bool, Self::Error>;

    /// Read the record into `buf`
    ///
    /// Returns the number of bytes read, or `None` if there is no record.
    /// A record longer than `buf` is truncated.
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Self::Error>;

    /// Replace the record
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Delete the record; removing a missing record is not an error
    fn remove(&mut self) -> Result<(), Self::Error>;
}
