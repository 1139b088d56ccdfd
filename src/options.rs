//! Explicit, field-enumerated configuration passed into the engine.

/// Engine-wide knobs. There is no global or environment-driven configuration;
/// every caller constructs an `Options` value (or uses [`Options::default`]).
#[derive(Debug, Clone)]
pub struct Options {
    /// Chunk size used when streaming file bodies during playback.
    pub chunk_size: usize,
    /// If true, a directory entry of an unsupported kind (socket, pipe,
    /// device) is a fatal [`crate::error::TartapeError::UnsupportedKind`]
    /// instead of being silently skipped.
    pub strict_unsupported: bool,
    /// Overrides the flattened numeric uid written into every header.
    /// Defaults to `0` ("root") when `None`.
    pub override_uid: Option<u32>,
    /// Overrides the flattened numeric gid written into every header.
    /// Defaults to `0` ("root") when `None`.
    pub override_gid: Option<u32>,
    /// Overrides the flattened uname written into every header. Defaults to
    /// `"root"` when `None`.
    pub override_uname: Option<String>,
    /// Overrides the flattened gname written into every header. Defaults to
    /// `"root"` when `None`.
    pub override_gname: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            chunk_size: 64 * 1024,
            strict_unsupported: false,
            override_uid: None,
            override_gid: None,
            override_uname: None,
            override_gname: None,
        }
    }
}

impl Options {
    pub(crate) fn uid(&self) -> u32 {
        self.override_uid.unwrap_or(0)
    }

    pub(crate) fn gid(&self) -> u32 {
        self.override_gid.unwrap_or(0)
    }

    pub(crate) fn uname(&self) -> &str {
        self.override_uname.as_deref().unwrap_or("root")
    }

    pub(crate) fn gname(&self) -> &str {
        self.override_gname.as_deref().unwrap_or("root")
    }
}
