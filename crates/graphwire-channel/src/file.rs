//! Buffered file channel for save games.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{Channel, ChannelError, SeekableChannel};

enum Handle {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
}

/// A file opened either for reading ([`FileChannel::open`]) or for
/// writing ([`FileChannel::create`]).
pub struct FileChannel {
    path: PathBuf,
    handle: Handle,
    position: u64,
}

impl FileChannel {
    /// Creates (or truncates) a file for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ChannelError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| ChannelError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "file channel created");
        Ok(Self {
            path,
            handle: Handle::Writer(BufWriter::new(file)),
            position: 0,
        })
    }

    /// Opens an existing file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChannelError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| ChannelError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "file channel opened");
        Ok(Self {
            path,
            handle: Handle::Reader(BufReader::new(file)),
            position: 0,
        })
    }

    /// The file this channel was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FileChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChannel")
            .field("path", &self.path)
            .field("position", &self.position)
            .finish()
    }
}

impl Channel for FileChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        match &mut self.handle {
            Handle::Reader(reader) => {
                let n = reader.read(buf).map_err(ChannelError::ReadFailed)?;
                self.position += n as u64;
                Ok(n)
            }
            Handle::Writer(_) => {
                Err(ChannelError::Unsupported("read from a file opened for writing"))
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        match &mut self.handle {
            Handle::Writer(writer) => {
                let n = writer.write(data).map_err(ChannelError::WriteFailed)?;
                self.position += n as u64;
                Ok(n)
            }
            Handle::Reader(_) => {
                Err(ChannelError::Unsupported("write to a file opened for reading"))
            }
        }
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        match &mut self.handle {
            Handle::Writer(writer) => writer.flush().map_err(ChannelError::WriteFailed),
            Handle::Reader(_) => Ok(()),
        }
    }

    fn describe(&self) -> String {
        format!("file {} at byte {}", self.path.display(), self.position)
    }
}

impl SeekableChannel for FileChannel {
    fn seek(&mut self, pos: u64) -> Result<(), ChannelError> {
        let reached = match &mut self.handle {
            Handle::Reader(reader) => reader.seek(SeekFrom::Start(pos)),
            Handle::Writer(writer) => writer.seek(SeekFrom::Start(pos)),
        }
        .map_err(ChannelError::SeekFailed)?;
        self.position = reached;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn size(&mut self) -> Result<u64, ChannelError> {
        let metadata = match &mut self.handle {
            Handle::Reader(reader) => reader.get_ref().metadata(),
            Handle::Writer(writer) => {
                writer.flush().map_err(ChannelError::WriteFailed)?;
                writer.get_ref().metadata()
            }
        }
        .map_err(ChannelError::ReadFailed)?;
        Ok(metadata.len())
    }
}

impl Drop for FileChannel {
    fn drop(&mut self) {
        if let Handle::Writer(writer) = &mut self.handle {
            if let Err(e) = writer.flush() {
                tracing::warn!(path = %self.path.display(), error = %e, "flush on close failed");
            }
        }
    }
}
