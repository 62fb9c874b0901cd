//! In-memory channels: a seekable buffer and a one-way thread pipe.

use std::sync::mpsc;

use crate::{Channel, ChannelError, SeekableChannel};

// ---------------------------------------------------------------------------
// MemoryChannel
// ---------------------------------------------------------------------------

/// A growable byte buffer with a read/write cursor.
///
/// Writes overwrite bytes under the cursor and extend the buffer past its
/// end, so a channel can be written, rewound with [`seek`], and read back.
///
/// [`seek`]: SeekableChannel::seek
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    buffer: Vec<u8>,
    cursor: usize,
}

impl MemoryChannel {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing bytes with the cursor at the start.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            buffer: bytes,
            cursor: 0,
        }
    }

    /// The full buffer, regardless of the cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the channel and returns its buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Bytes between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.cursor)
    }
}

impl Channel for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.buffer[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        let end = self.cursor + data.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[self.cursor..end].copy_from_slice(data);
        self.cursor = end;
        Ok(data.len())
    }

    fn describe(&self) -> String {
        format!("memory buffer ({} bytes)", self.buffer.len())
    }

    fn into_bytes(self: Box<Self>) -> Option<Vec<u8>> {
        Some(self.buffer)
    }
}

impl SeekableChannel for MemoryChannel {
    fn seek(&mut self, pos: u64) -> Result<(), ChannelError> {
        let pos = usize::try_from(pos)
            .map_err(|_| ChannelError::Unsupported("seek beyond addressable memory"))?;
        if pos > self.buffer.len() {
            self.buffer.resize(pos, 0);
        }
        self.cursor = pos;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.cursor as u64
    }

    fn size(&mut self) -> Result<u64, ChannelError> {
        Ok(self.buffer.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Pipe
// ---------------------------------------------------------------------------

/// Creates a one-way in-process pipe.
///
/// Bytes written to the [`PipeWriter`] become readable from the
/// [`PipeReader`] in order. Reads block until data arrives; once the
/// writer is dropped and the backlog drained, reads return end of stream.
/// Two pipes make a loopback duplex link for connection tests.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel();
    (
        PipeWriter { tx, sent: 0 },
        PipeReader {
            rx,
            pending: Vec::new(),
            offset: 0,
            received: 0,
        },
    )
}

/// Write end of a [`pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<Vec<u8>>,
    sent: u64,
}

/// Read end of a [`pipe`].
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
    received: u64,
}

impl Channel for PipeWriter {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ChannelError> {
        Err(ChannelError::Unsupported("read from the write end of a pipe"))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        self.tx
            .send(data.to_vec())
            .map_err(|_| ChannelError::Closed("pipe reader dropped".into()))?;
        self.sent += data.len() as u64;
        Ok(data.len())
    }

    fn describe(&self) -> String {
        format!("pipe writer ({} bytes sent)", self.sent)
    }
}

impl Channel for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset >= self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                // Writer gone and backlog drained.
                Err(_) => return Ok(0),
            }
        }
        let available = &self.pending[self.offset..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        self.received += n as u64;
        Ok(n)
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize, ChannelError> {
        Err(ChannelError::Unsupported("write to the read end of a pipe"))
    }

    fn describe(&self) -> String {
        format!("pipe reader ({} bytes received)", self.received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_bytes_through_trait_object() {
        let mut boxed: Box<dyn Channel> = Box::new(MemoryChannel::new());
        boxed.write_all(&[9, 8, 7]).unwrap();
        assert_eq!(boxed.into_bytes(), Some(vec![9, 8, 7]));

        let (writer, _reader) = pipe();
        let boxed: Box<dyn Channel> = Box::new(writer);
        assert_eq!(boxed.into_bytes(), None);
    }

    #[test]
    fn test_memory_write_then_read_back() {
        let mut ch = MemoryChannel::new();
        ch.write_all(&[1, 2, 3]).unwrap();
        ch.seek(0).unwrap();

        let mut buf = [0u8; 3];
        ch.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_memory_short_read_at_end() {
        let mut ch = MemoryChannel::from_bytes(vec![7, 8]);
        let mut buf = [0u8; 5];
        assert_eq!(ch.read(&mut buf).unwrap(), 2);
        assert_eq!(ch.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_memory_overwrite_in_place() {
        let mut ch = MemoryChannel::from_bytes(vec![0, 0, 0, 0]);
        ch.seek(1).unwrap();
        ch.write_all(&[9, 9]).unwrap();
        assert_eq!(ch.as_bytes(), &[0, 9, 9, 0]);
        assert_eq!(ch.tell(), 3);
    }

    #[test]
    fn test_memory_seek_past_end_zero_fills() {
        let mut ch = MemoryChannel::new();
        ch.seek(4).unwrap();
        ch.write_all(&[1]).unwrap();
        assert_eq!(ch.size().unwrap(), 5);
        assert_eq!(ch.into_inner(), vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_pipe_delivers_across_threads() {
        let (mut tx, mut rx) = pipe();
        let handle = std::thread::spawn(move || {
            tx.write_all(&[1, 2]).unwrap();
            tx.write_all(&[3]).unwrap();
        });

        let mut buf = [0u8; 3];
        rx.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        handle.join().unwrap();
    }

    #[test]
    fn test_pipe_reports_eof_after_writer_dropped() {
        let (tx, mut rx) = pipe();
        drop(tx);
        let mut buf = [0u8; 1];
        assert_eq!(rx.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_pipe_ends_are_one_way() {
        let (mut tx, mut rx) = pipe();
        assert!(matches!(
            tx.read(&mut [0u8; 1]),
            Err(ChannelError::Unsupported(_))
        ));
        assert!(matches!(rx.write(&[1]), Err(ChannelError::Unsupported(_))));
    }
}
