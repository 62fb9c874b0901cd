//! Save file writer and reader.
//!
//! A save is the magic bytes, a `u32` format version in the writer's byte
//! order, then whatever root values the game writes (usually the static
//! rule tables followed by the full game state).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use graphwire_channel::FileChannel;
use graphwire_core::{
    Decode, Decoder, Encode, Encoder, Endianness, FORMAT_VERSION, SerializeError,
    SerializerConfig, TypeRegistry,
};

use crate::{SaveConfig, SaveError};

/// First bytes of every save file.
pub const SAVEGAME_MAGIC: [u8; 7] = *b"GRAPHSV";

// ---------------------------------------------------------------------------
// SaveWriter
// ---------------------------------------------------------------------------

/// Writes a save file. Identities are shared across every value written
/// to the same writer.
#[derive(Debug)]
pub struct SaveWriter {
    path: PathBuf,
    encoder: Encoder,
}

impl SaveWriter {
    /// Creates (or truncates) `path` and writes the header in host byte
    /// order.
    pub fn create(path: impl AsRef<Path>, registry: Arc<TypeRegistry>) -> Result<Self, SaveError> {
        Self::create_with(
            path,
            registry,
            SerializerConfig::default(),
            Endianness::native(),
        )
    }

    /// Like [`create`](Self::create) with explicit serializer settings and
    /// byte order.
    pub fn create_with(
        path: impl AsRef<Path>,
        registry: Arc<TypeRegistry>,
        config: SerializerConfig,
        byte_order: Endianness,
    ) -> Result<Self, SaveError> {
        let path = path.as_ref().to_path_buf();
        let channel = FileChannel::create(&path)?;
        let mut encoder = Encoder::new(channel, registry)
            .with_config(config)
            .with_byte_order(byte_order);
        encoder.write_bytes(&SAVEGAME_MAGIC)?;
        encoder.write_u32(FORMAT_VERSION)?;
        tracing::info!(path = %path.display(), version = FORMAT_VERSION, "writing save");
        Ok(Self { path, encoder })
    }

    /// Appends one root value.
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> Result<(), SaveError> {
        self.encoder.write(value)?;
        Ok(())
    }

    /// Direct access for values that need the encoder itself.
    pub fn encoder_mut(&mut self) -> &mut Encoder {
        &mut self.encoder
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the file and returns the total bytes written, header
    /// included.
    pub fn finish(mut self) -> Result<u64, SaveError> {
        self.encoder.flush()?;
        let written = self.encoder.bytes_written();
        tracing::info!(path = %self.path.display(), bytes = written, "save written");
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// SaveReader
// ---------------------------------------------------------------------------

/// Loads a save file written by [`SaveWriter`].
#[derive(Debug)]
pub struct SaveReader {
    path: PathBuf,
    decoder: Decoder,
}

impl SaveReader {
    /// Opens `path` and validates its header.
    ///
    /// Fails with a corrupt-stream error when the magic bytes differ, the
    /// version is older than `config.minimum_version`, or the version is
    /// newer than this build can read. A version that only matches after
    /// byte swapping means the file was written on a host of the other
    /// byte order; reading then continues with byte reversal.
    pub fn open(
        path: impl AsRef<Path>,
        registry: Arc<TypeRegistry>,
        config: SaveConfig,
    ) -> Result<Self, SaveError> {
        let path = path.as_ref().to_path_buf();
        let channel = FileChannel::open(&path)?;
        let decoder = Decoder::new(channel, registry).with_config(config.serializer.clone());
        Self::from_decoder(path, decoder, &config)
    }

    pub(crate) fn from_decoder(
        path: PathBuf,
        mut decoder: Decoder,
        config: &SaveConfig,
    ) -> Result<Self, SaveError> {
        match read_header(&mut decoder, config.minimum_version) {
            Ok(()) => {}
            Err(SerializeError::Channel(e)) => return Err(SaveError::Channel(e)),
            Err(source) => return Err(SaveError::Header { path, source }),
        }
        tracing::info!(
            path = %path.display(),
            version = decoder.version(),
            reversed = decoder.reverse_endianness(),
            "save opened"
        );
        Ok(Self { path, decoder })
    }

    pub(crate) fn from_parts(path: PathBuf, decoder: Decoder) -> Self {
        Self { path, decoder }
    }

    pub(crate) fn into_parts(self) -> (PathBuf, Decoder) {
        (self.path, self.decoder)
    }

    /// Reads the next root value.
    pub fn read<T: Decode>(&mut self) -> Result<T, SaveError> {
        Ok(self.decoder.read()?)
    }

    /// Reads the next root value into an existing one.
    pub fn read_into<T: Decode>(&mut self, target: &mut T) -> Result<(), SaveError> {
        Ok(self.decoder.read_into(target)?)
    }

    /// Format version the save was written with.
    pub fn version(&self) -> u32 {
        self.decoder.version()
    }

    /// `true` when the save came from a host of the other byte order.
    pub fn reverse_endianness(&self) -> bool {
        self.decoder.reverse_endianness()
    }

    pub fn bytes_read(&self) -> u64 {
        self.decoder.bytes_read()
    }

    pub fn decoder_mut(&mut self) -> &mut Decoder {
        &mut self.decoder
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` once every byte of the file has been consumed.
    /// Does not move the read position.
    pub fn at_end(&mut self) -> Result<bool, SaveError> {
        Ok(self.decoder.at_end()?)
    }
}

/// Checks the magic bytes and version, and sets the decoder's version and
/// byte order from them.
fn read_header(dec: &mut Decoder, minimum_version: u32) -> Result<(), SerializeError> {
    let mut magic = [0u8; SAVEGAME_MAGIC.len()];
    dec.read_bytes(&mut magic)?;
    if magic != SAVEGAME_MAGIC {
        return Err(SerializeError::corrupt(
            format!("bad save magic {magic:?}"),
            Some(0),
        ));
    }

    let offset = dec.bytes_read();
    let mut version = dec.read_u32()?;
    if version > FORMAT_VERSION {
        let swapped = version.swap_bytes();
        if swapped != FORMAT_VERSION {
            return Err(SerializeError::corrupt(
                format!("save version {version} is newer than supported {FORMAT_VERSION}"),
                Some(offset),
            ));
        }
        tracing::warn!(version = swapped, "save written with the other byte order, reversing");
        dec.set_stream_order(dec.stream_order().flipped());
        version = swapped;
    }
    if version < minimum_version {
        return Err(SerializeError::corrupt(
            format!("save version {version} is older than minimum {minimum_version}"),
            Some(offset),
        ));
    }
    dec.set_version(version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::new())
    }

    #[test]
    fn test_write_then_read_scalars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalars.gws");

        let mut writer = SaveWriter::create(&path, registry()).unwrap();
        writer.write(&42u32).unwrap();
        writer.write("turn 12").unwrap();
        let written = writer.finish().unwrap();
        // magic + version + u32 + (len + 7 bytes)
        assert_eq!(written, 7 + 4 + 4 + 4 + 7);

        let mut reader = SaveReader::open(&path, registry(), SaveConfig::default()).unwrap();
        assert_eq!(reader.version(), FORMAT_VERSION);
        assert_eq!(reader.read::<u32>().unwrap(), 42);
        assert_eq!(reader.read::<String>().unwrap(), "turn 12");
        assert!(reader.at_end().unwrap());
    }

    #[test]
    fn test_at_end_between_values_loses_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pair.gws");

        let mut writer = SaveWriter::create(&path, registry()).unwrap();
        writer.write(&0x0102_0304u32).unwrap();
        writer.write(&0x0A0B_0C0Du32).unwrap();
        writer.finish().unwrap();

        let mut reader = SaveReader::open(&path, registry(), SaveConfig::default()).unwrap();
        assert_eq!(reader.read::<u32>().unwrap(), 0x0102_0304);
        assert!(!reader.at_end().unwrap());
        assert_eq!(reader.bytes_read(), 7 + 4 + 4);
        assert_eq!(reader.read::<u32>().unwrap(), 0x0A0B_0C0D);
        assert_eq!(reader.bytes_read(), 7 + 4 + 8);
        assert!(reader.at_end().unwrap());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SaveReader::open(dir.path().join("nope.gws"), registry(), SaveConfig::default())
            .unwrap_err();
        assert!(matches!(err, SaveError::Channel(_)));
    }
}
