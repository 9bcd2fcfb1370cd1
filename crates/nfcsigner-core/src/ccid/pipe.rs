//! Raw bulk endpoint access.

use std::time::Duration;

use crate::error::Result;

/// A pair of bulk endpoints on a claimed CCID interface.
///
/// Implementations perform exactly one USB transfer per call. A read that
/// times out may either return `Ok(0)` or an error; the engine treats both
/// as "nothing arrived".
pub trait BulkPipe {
    /// Writes `data` to the bulk OUT endpoint, returning the bytes sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails or times out.
    fn write_bulk(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Reads one transfer from the bulk IN endpoint into `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails or times out.
    fn read_bulk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

impl<P: BulkPipe + ?Sized> BulkPipe for &mut P {
    fn write_bulk(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).write_bulk(data, timeout)
    }

    fn read_bulk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read_bulk(buf, timeout)
    }
}

impl<P: BulkPipe + ?Sized> BulkPipe for Box<P> {
    fn write_bulk(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).write_bulk(data, timeout)
    }

    fn read_bulk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read_bulk(buf, timeout)
    }
}
