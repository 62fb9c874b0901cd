//! Lockstep comparison of two saves of the same logical state.
//!
//! Peers that each keep a "control" save of the state they believe they
//! share can catch nondeterminism early: load the primary and the control
//! save together, and the first byte at which they disagree points at the
//! value that diverged.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use graphwire_channel::{Channel, ChannelError, FileChannel};
use graphwire_core::{Decode, Decoder, TypeRegistry};

use crate::{SaveConfig, SaveError, SaveReader};

/// Terminal state of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Every byte read so far matched.
    NoDivergence,
    /// The streams first disagreed here. Offsets count from the start of
    /// each file.
    DivergenceFound {
        primary_offset: u64,
        control_offset: u64,
    },
}

impl ValidationOutcome {
    pub fn diverged(&self) -> bool {
        matches!(self, Self::DivergenceFound { .. })
    }
}

#[derive(Debug)]
struct LockstepState {
    outcome: ValidationOutcome,
    /// Cleared on divergence or decay; the control stream is no longer read.
    comparing: bool,
}

/// Reads the primary stream and mirrors every read on the control stream,
/// recording the first mismatch in the shared state.
struct LockstepChannel {
    primary: FileChannel,
    control: FileChannel,
    primary_read: u64,
    control_read: u64,
    scratch: Vec<u8>,
    state: Arc<Mutex<LockstepState>>,
}

impl LockstepChannel {
    /// Fills `scratch[..len]` from the control stream, stopping early at
    /// end of stream. Returns how many bytes arrived.
    fn read_control(&mut self, len: usize) -> Result<usize, ChannelError> {
        self.scratch.resize(len, 0);
        let mut filled = 0;
        while filled < len {
            let n = self.control.read(&mut self.scratch[filled..len])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.control_read += filled as u64;
        Ok(filled)
    }

    fn diverge(
        &self,
        state: &mut LockstepState,
        index: usize,
        primary_start: u64,
        control_start: u64,
    ) {
        let primary_offset = primary_start + index as u64;
        let control_offset = control_start + index as u64;
        tracing::error!(
            primary = %self.primary.path().display(),
            control = %self.control.path().display(),
            primary_offset,
            control_offset,
            "save streams diverged"
        );
        state.outcome = ValidationOutcome::DivergenceFound {
            primary_offset,
            control_offset,
        };
        state.comparing = false;
    }
}

impl Channel for LockstepChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let primary_start = self.primary_read;
        let n = self.primary.read(buf)?;
        self.primary_read += n as u64;

        let shared = Arc::clone(&self.state);
        let mut state = shared
            .lock()
            .map_err(|_| ChannelError::Closed("validator state poisoned".into()))?;
        if !state.comparing {
            return Ok(n);
        }

        let control_start = self.control_read;
        // At the end of the primary stream, a control stream with bytes
        // left over is a divergence too.
        let wanted = n.max(1);
        let got = self.read_control(wanted)?;
        let compared = n.min(got);
        if let Some(index) = (0..compared).find(|&i| buf[i] != self.scratch[i]) {
            self.diverge(&mut state, index, primary_start, control_start);
        } else if got != n {
            self.diverge(&mut state, compared, primary_start, control_start);
        }
        Ok(n)
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize, ChannelError> {
        Err(ChannelError::Unsupported("write to a save being validated"))
    }

    fn describe(&self) -> String {
        format!(
            "lockstep {} / {}",
            self.primary.describe(),
            self.control.describe()
        )
    }
}

/// Loads a primary save while comparing it byte for byte with a control
/// save.
///
/// Values are decoded from the primary stream only. Divergence is not an
/// error: [`outcome`](Self::outcome) reports it, and decoding carries on
/// from the primary.
///
/// ```ignore
/// let mut validator = IntegrityValidator::open(&primary, &control, registry, config)?;
/// let state: GameState = validator.read()?;
/// if let ValidationOutcome::DivergenceFound { primary_offset, .. } = validator.finish()? {
///     // report desync
/// }
/// ```
pub struct IntegrityValidator {
    path: PathBuf,
    decoder: Decoder,
    state: Arc<Mutex<LockstepState>>,
}

impl IntegrityValidator {
    /// Opens both files and validates the header through the lockstep
    /// reader, so header differences count as divergence too.
    pub fn open(
        primary: impl AsRef<Path>,
        control: impl AsRef<Path>,
        registry: Arc<TypeRegistry>,
        config: SaveConfig,
    ) -> Result<Self, SaveError> {
        let path = primary.as_ref().to_path_buf();
        let state = Arc::new(Mutex::new(LockstepState {
            outcome: ValidationOutcome::NoDivergence,
            comparing: true,
        }));
        let channel = LockstepChannel {
            primary: FileChannel::open(&path)?,
            control: FileChannel::open(control.as_ref())?,
            primary_read: 0,
            control_read: 0,
            scratch: Vec::new(),
            state: Arc::clone(&state),
        };
        let decoder = Decoder::new(channel, registry).with_config(config.serializer.clone());
        let reader = SaveReader::from_decoder(path, decoder, &config)?;
        let (path, decoder) = reader.into_parts();
        tracing::debug!(path = %path.display(), "integrity validation started");
        Ok(Self {
            path,
            decoder,
            state,
        })
    }

    /// Reads the next root value from the primary save.
    pub fn read<T: Decode>(&mut self) -> Result<T, SaveError> {
        Ok(self.decoder.read()?)
    }

    /// Comparison result so far.
    pub fn outcome(&self) -> Result<ValidationOutcome, SaveError> {
        Ok(self.state.lock().map_err(|_| SaveError::Poisoned)?.outcome)
    }

    /// Probes both streams for trailing bytes and returns the final
    /// outcome.
    pub fn finish(mut self) -> Result<ValidationOutcome, SaveError> {
        let mut probe = [0u8; 1];
        while self.decoder.channel_mut().read(&mut probe)? != 0 {
            if self.outcome()?.diverged() {
                break;
            }
        }
        self.outcome()
    }

    /// Stops comparing and continues as a plain reader of the primary
    /// save.
    pub fn decay(self) -> Result<SaveReader, SaveError> {
        self.state.lock().map_err(|_| SaveError::Poisoned)?.comparing = false;
        tracing::debug!(path = %self.path.display(), "integrity validator decayed");
        Ok(SaveReader::from_parts(self.path, self.decoder))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for IntegrityValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityValidator")
            .field("path", &self.path)
            .field("decoder", &self.decoder)
            .finish()
    }
}
