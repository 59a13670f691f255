//! On-demand Sass compilation for requested `.css` files.
//!
//! A request for `/styles/site.css` compiles `<public>/styles/site.scss` into
//! `<public>/styles/site.css` before the static file server sees the request.
//! Outside development the target is only rebuilt when it is missing or older
//! than its source; development always rebuilds and emits expanded output.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::ServiceError;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Environment;
use crate::server::errors::AppError;

/// Errors from compiling one style sheet.
#[derive(Debug, Error)]
pub enum StylesheetError {
    #[error("failed to compile {path}: {message}")]
    Compile { path: String, message: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Compiles `.scss` sources under a root directory into sibling `.css` files.
#[derive(Debug, Clone)]
pub struct StylesheetCompiler {
    root: PathBuf,
    force: bool,
    style: grass::OutputStyle,
}

impl StylesheetCompiler {
    pub fn new(root: impl Into<PathBuf>, environment: Environment) -> Self {
        let development = environment.is_development();
        Self {
            root: root.into(),
            force: development,
            style: if development {
                grass::OutputStyle::Expanded
            } else {
                grass::OutputStyle::Compressed
            },
        }
    }

    /// Map a request path to its `(source, target)` pair.
    ///
    /// Returns `None` for non-`.css` paths and for paths that would escape
    /// the root.
    pub fn sources_for(&self, request_path: &str) -> Option<(PathBuf, PathBuf)> {
        let relative = request_path.trim_start_matches('/');
        let stem = relative.strip_suffix(".css")?;
        if stem.is_empty() {
            return None;
        }
        let escapes = Path::new(relative)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return None;
        }
        let target = self.root.join(relative);
        let source = self.root.join(format!("{stem}.scss"));
        Some((source, target))
    }

    /// Compile the style sheet behind `request_path` if it needs rebuilding.
    ///
    /// Returns `Ok(true)` when a file was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to compile or the target cannot
    /// be written.
    pub fn compile_if_stale(&self, request_path: &str) -> Result<bool, StylesheetError> {
        let Some((source, target)) = self.sources_for(request_path) else {
            return Ok(false);
        };
        if !source.is_file() || !(self.force || is_stale(&source, &target)) {
            return Ok(false);
        }

        let options = grass::Options::default().style(self.style);
        let css = grass::from_path(&source, &options).map_err(|e| StylesheetError::Compile {
            path: source.display().to_string(),
            message: e.to_string(),
        })?;
        replace_file(&target, css.as_bytes()).map_err(|source_err| StylesheetError::Write {
            path: target.display().to_string(),
            source: source_err,
        })?;

        if self.force {
            info!(source = %source.display(), target = %target.display(), "compiled style sheet");
        } else {
            debug!(source = %source.display(), target = %target.display(), "compiled style sheet");
        }
        Ok(true)
    }
}

/// Write `contents` to a sibling temporary file, then rename it over
/// `target`. Readers see either the previous file or the complete new one.
fn replace_file(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = target.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));
    std::fs::write(&temp, contents)?;
    std::fs::rename(&temp, target).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp);
    })
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn is_stale(source: &Path, target: &Path) -> bool {
    match (modified(source), modified(target)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

/// Middleware compiling a requested style sheet before it is served.
///
/// Compile failures become a 500 for the error page.
pub async fn compile_stylesheets(
    State(compiler): State<Arc<StylesheetCompiler>>,
    req: Request,
    next: Next,
) -> Response {
    let is_read = req.method() == Method::GET || req.method() == Method::HEAD;
    if is_read && req.uri().path().ends_with(".css") {
        let path = req.uri().path().to_owned();
        let worker = Arc::clone(&compiler);
        let compiled = tokio::task::spawn_blocking(move || worker.compile_if_stale(&path)).await;
        match compiled {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return AppError(ServiceError::upstream(e.to_string())).into_response(),
            Err(e) => {
                return AppError(ServiceError::upstream(format!("style sheet task failed: {e}")))
                    .into_response()
            }
        }
    }
    next.run(req).await
}
