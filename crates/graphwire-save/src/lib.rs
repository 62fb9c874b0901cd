//! Save files for Graphwire.
//!
//! - [`SaveWriter`] / [`SaveReader`] write and load a save: the
//!   [`SAVEGAME_MAGIC`] bytes, the format version, then root values.
//! - [`IntegrityValidator`] loads a save while comparing it against a
//!   control copy and reports the first byte where they diverge.
//!
//! Loading rejects a wrong magic, a version older than
//! [`SaveConfig::minimum_version`], and a version newer than this build.
//! A save from a host of the other byte order is detected from its
//! version field and read with byte reversal.

mod config;
mod error;
mod save;
mod validator;

pub use config::{MINIMUM_SUPPORTED_VERSION, SaveConfig};
pub use error::SaveError;
pub use save::{SAVEGAME_MAGIC, SaveReader, SaveWriter};
pub use validator::{IntegrityValidator, ValidationOutcome};
