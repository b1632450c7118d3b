pub mod error;
pub mod read;

pub use error::{BtiError, FormatError, Result};
pub use read::bti::{read_raw_bti, read_raw_bti_session, MeasInfo, RawBti, ReadOptions};
pub use read::BtiPaths;
