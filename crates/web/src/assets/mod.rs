//! Static asset handling: favicon, public directory, compiled style sheets.
//!
//! These run ahead of the session stage. A request answered here never
//! touches the session store, the identity store or the route groups.

pub mod stylesheet;

use std::path::PathBuf;
use std::sync::Arc;

pub use stylesheet::{compile_stylesheets, StylesheetCompiler};

use crate::config::Environment;

/// Filesystem locations served ahead of the dynamic pipeline.
#[derive(Debug, Clone)]
pub struct StaticAssets {
    /// Directory served verbatim.
    pub public_dir: PathBuf,
    /// File answered for `/favicon.ico`.
    pub favicon: PathBuf,
    pub stylesheets: Arc<StylesheetCompiler>,
}

impl StaticAssets {
    pub fn new(
        public_dir: impl Into<PathBuf>,
        favicon: impl Into<PathBuf>,
        environment: Environment,
    ) -> Self {
        let public_dir = public_dir.into();
        Self {
            stylesheets: Arc::new(StylesheetCompiler::new(public_dir.clone(), environment)),
            favicon: favicon.into(),
            public_dir,
        }
    }
}
