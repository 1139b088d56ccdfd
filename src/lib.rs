//! `tartape`: a deterministic, resumable USTAR archive streamer.
//!
//! A [`TapeRecorder`] walks a directory tree once and commits a snapshot
//! (the T0 inventory). A [`Tape`] loads that snapshot back, and a
//! [`TapePlayer`] replays it against a (possibly later) copy of the same
//! tree as a byte-exact, resumable stream of [`player::Event`]s, verifying
//! each entry's integrity as it goes.
//!
//! Two runs over the same tree produce byte-identical archives: entries are
//! ordered by raw byte comparison of their archive path, never by locale or
//! filesystem iteration order.

pub mod error;
pub mod fingerprint;
pub mod header;
pub mod model;
pub mod offset;
pub mod options;
pub mod order;
pub mod player;
pub mod recorder;
pub mod store;
pub mod tape;
pub mod walk;

pub use error::{Result, TartapeError};
pub use model::{Entry, EntryKind, Region};
pub use options::Options;
pub use player::{Event, PlaySession, TapePlayer};
pub use recorder::TapeRecorder;
pub use tape::Tape;
