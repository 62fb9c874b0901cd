//! Byte channel abstraction layer for Graphwire.
//!
//! Provides the [`Channel`] trait that the encoder and decoder read and
//! write through, plus the concrete channels the engine ships with:
//!
//! - [`MemoryChannel`]: growable in-memory buffer, seekable
//! - [`FileChannel`]: buffered file, seekable
//! - [`SocketChannel`]: blocking TCP stream, strictly sequential
//! - [`pipe`]: in-process one-way pipe, sequential
//!
//! [`TcpTransport`] accepts incoming TCP connections on the Tokio runtime
//! and hands them out as blocking [`SocketChannel`]s.

#![allow(async_fn_in_trait)]

mod error;
mod file;
mod memory;
mod socket;

pub use error::ChannelError;
pub use file::FileChannel;
pub use memory::{pipe, MemoryChannel, PipeReader, PipeWriter};
pub use socket::{ShutdownHandle, SocketChannel, TcpTransport, Transport};

/// An ordered byte sink/source.
///
/// `read` may return fewer bytes than requested only at the end of the
/// stream; socket channels block the calling thread until data arrives or
/// the peer closes. Channels are moved between threads (a connection's
/// halves live behind mutexes), hence the `Send` bound.
pub trait Channel: Send {
    /// Reads up to `buf.len()` bytes. Returns `Ok(0)` at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError>;

    /// Writes bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError>;

    /// Pushes buffered bytes to the underlying sink.
    fn flush(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Human-readable description used in state reports and logs.
    fn describe(&self) -> String;

    /// Consumes the channel and hands back the bytes it holds in memory.
    /// `None` for channels backed by anything else.
    fn into_bytes(self: Box<Self>) -> Option<Vec<u8>> {
        None
    }

    /// Fills `buf` completely or fails with [`ChannelError::UnexpectedEof`].
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ChannelError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(ChannelError::UnexpectedEof {
                    wanted: buf.len(),
                    got: filled,
                });
            }
            filled += n;
        }
        Ok(())
    }

    /// Writes every byte of `data`.
    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        let mut written = 0;
        while written < data.len() {
            let n = self.write(&data[written..])?;
            if n == 0 {
                return Err(ChannelError::Closed(format!(
                    "{} accepted 0 bytes",
                    self.describe()
                )));
            }
            written += n;
        }
        Ok(())
    }
}

/// A channel with a random-access cursor (files, memory buffers).
pub trait SeekableChannel: Channel {
    /// Moves the cursor to an absolute byte offset.
    fn seek(&mut self, pos: u64) -> Result<(), ChannelError>;

    /// Current cursor offset.
    fn tell(&self) -> u64;

    /// Total size of the stream in bytes.
    fn size(&mut self) -> Result<u64, ChannelError>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        (**self).flush()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most one byte per read to exercise `read_exact` loops.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
    }

    impl Channel for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
            if self.pos >= self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }

        fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
            Ok(data.len().min(1))
        }

        fn describe(&self) -> String {
            "trickle".into()
        }
    }

    #[test]
    fn test_read_exact_loops_over_short_reads() {
        let mut ch = Trickle {
            data: vec![1, 2, 3, 4],
            pos: 0,
        };
        let mut buf = [0u8; 4];
        ch.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_read_exact_reports_eof() {
        let mut ch = Trickle {
            data: vec![9],
            pos: 0,
        };
        let mut buf = [0u8; 3];
        let err = ch.read_exact(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::UnexpectedEof { wanted: 3, got: 1 }
        ));
    }

    #[test]
    fn test_write_all_loops_over_short_writes() {
        let mut ch = Trickle {
            data: vec![],
            pos: 0,
        };
        ch.write_all(&[1, 2, 3]).unwrap();
    }

    #[test]
    fn test_boxed_channel_delegates() {
        let mut boxed: Box<dyn Channel> = Box::new(MemoryChannel::new());
        boxed.write_all(&[5, 6]).unwrap();
        assert_eq!(boxed.describe(), "memory buffer (2 bytes)");
    }
}
