use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid context path {path:?}: {reason}")]
    InvalidContextPath { path: String, reason: &'static str },

    #[error("cache_dir {path:?} is the build context itself; use a subdirectory such as \".strata\"")]
    InvalidCacheDir { path: String },

    #[error("invalid fingerprint {value:?}: expected 64 lowercase hex characters")]
    InvalidFingerprint { value: String },

    // ── Plan validation ──
    #[error("build plan has no SET_BASE step")]
    MissingBase,

    #[error("SET_BASE must be the first step, found at step {}", .index + 1)]
    BaseNotFirst { index: usize },

    #[error("build plan declares more than one SET_BASE step")]
    MultipleBases,

    #[error(
        "RUN at step {} has no manifest COPY before it; copy the dependency manifest on its own before installing",
        .run_index + 1
    )]
    MissingManifestCopy { run_index: usize },

    #[error(
        "full source COPY at step {} precedes RUN at step {}; every source edit would reinstall dependencies",
        .copy_index + 1,
        .run_index + 1
    )]
    SourceCopyBeforeInstall { copy_index: usize, run_index: usize },

    #[error("COPY at step {} overlaps {path:?}, already copied by an earlier step", .copy_index + 1)]
    OverlappingCopies { copy_index: usize, path: String },

    #[error("build plan has no DECLARE_PORT step")]
    MissingPortDeclaration,

    #[error("build plan declares more than one DECLARE_PORT step")]
    MultiplePortDeclarations,

    #[error("declared port {declared} does not match launch port {launch}")]
    PortMismatch { declared: u16, launch: u16 },
}
