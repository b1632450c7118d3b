use thiserror::Error;

pub type Result<T> = std::result::Result<T, BtiError>;

#[derive(Error, Debug)]
pub enum BtiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Invalid read options: {0}")]
    Options(String),
}

impl BtiError {
    pub fn as_format(&self) -> Option<&FormatError> {
        match self {
            BtiError::Format(err) => Some(err),
            _ => None,
        }
    }
}

/// Structural problems in one of the 4D files. None of these are recoverable:
/// a decode pass that hits one returns no partial data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("requested {requested} bytes at offset {offset}, but only {remaining} remain")]
    UnexpectedEof {
        offset: u64,
        requested: u64,
        remaining: u64,
    },

    #[error(
        "user block {index} has an empty kind tag; the data were probably acquired \
         with an unsupported acquisition software version"
    )]
    EmptyBlockKind { index: usize },

    #[error("cannot decode block `{block}`: `{dependency}` must be declared earlier in the file")]
    MissingDependency {
        block: String,
        dependency: &'static str,
    },

    #[error("inconsistent header offset: {0}")]
    HeaderOffset(String),

    #[error("unsupported data format {0} (expected 1, 2, 3 or 4)")]
    UnsupportedDataFormat(i16),

    #[error("PDF/config channel set mismatch: PDF has {pdf:?}, config describes {config:?}")]
    ChannelMismatch { pdf: Vec<i16>, config: Vec<i16> },

    #[error("invalid data range supplied: {start}, {stop} (total slices {total})")]
    InvalidRange { start: i64, stop: i64, total: i64 },

    #[error("channel `{0}` already follows Neuromag naming, channels may only be renamed once")]
    AlreadyRenamed(String),

    #[error("negative count {count} declared for {what}")]
    NegativeCount { what: &'static str, count: i64 },

    #[error("fiducial points are degenerate, cannot align head frame")]
    DegenerateFiducials,

    #[error("invalid sample period {0}")]
    InvalidSamplePeriod(f32),
}
