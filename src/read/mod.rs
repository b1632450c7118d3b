use std::path::{Path, PathBuf};

pub mod bti;

use bti::constants::{DEFAULT_CONFIG_NAME, DEFAULT_HEAD_SHAPE_NAME};

// The files making up one 4D recording.
// The acquisition software writes each run into its own directory:
//
// <session>/
//     -> <pdf name>   (e.g. `c,rfDC`, samples and acquisition header)
//     -> config       (system config for the scanner at acquisition time)
//     -> hs_file      (digitized head shape)
//
// Exported runs sometimes rename the config or head shape file; override
// them with `with_config` and `with_head_shape`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtiPaths {
    root: PathBuf,
    pdf: PathBuf,
    config: PathBuf,
    head_shape: PathBuf,
}

impl BtiPaths {
    pub fn new<P: AsRef<Path>>(root: P, pdf_name: &str) -> Self {
        let root = root.as_ref().to_path_buf();

        Self {
            pdf: root.join(pdf_name),
            config: root.join(DEFAULT_CONFIG_NAME),
            head_shape: root.join(DEFAULT_HEAD_SHAPE_NAME),
            root,
        }
    }

    pub fn with_config(mut self, name: &str) -> Self {
        self.config = self.root.join(name);
        self
    }

    pub fn with_head_shape(mut self, name: &str) -> Self {
        self.head_shape = self.root.join(name);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pdf(&self) -> &Path {
        &self.pdf
    }

    pub fn config(&self) -> &Path {
        &self.config
    }

    pub fn head_shape(&self) -> &Path {
        &self.head_shape
    }
}
