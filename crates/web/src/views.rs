//! Handlebars view registry.
//!
//! Templates are loaded from `<views>/**/*.hbs` and named by their path
//! relative to the views directory without the extension (`error`,
//! `channel/show`). Every file in `<views>/partials` is also registered under
//! its file stem, so `{{> header}}` works from any view. In development both
//! views and partials are re-read from disk on every render.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::response::Html;
use common::{ServiceError, ViewContext};
use handlebars::{DirectorySourceOptions, Handlebars};

use crate::config::Environment;

/// Name of the view rendered by the error terminal stage.
pub const ERROR_VIEW: &str = "error";

/// Cheaply cloneable handle to the template registry.
#[derive(Clone, Debug)]
pub struct Views {
    registry: Arc<Handlebars<'static>>,
}

impl Views {
    /// Load every template and partial under `dir`.
    ///
    /// In development the registry re-reads templates from disk on every
    /// render.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or a template fails
    /// to parse.
    pub fn from_dir(dir: impl AsRef<Path>, environment: Environment) -> Result<Self> {
        let dir = dir.as_ref();
        let mut registry = Handlebars::new();
        // Must precede registration: file sources are only kept in dev mode.
        registry.set_dev_mode(environment.is_development());
        registry
            .register_templates_directory(dir, DirectorySourceOptions::default())
            .with_context(|| format!("failed to load views from {}", dir.display()))?;

        let partials = dir.join("partials");
        if partials.is_dir() {
            for entry in std::fs::read_dir(&partials)
                .with_context(|| format!("failed to list {}", partials.display()))?
            {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("hbs") {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                // Partial lookup falls back to templates, and file-backed
                // templates are re-read in dev mode.
                registry
                    .register_template_file(name, &path)
                    .with_context(|| format!("invalid partial {}", path.display()))?;
            }
        }

        Ok(Self::from_registry(registry))
    }

    /// Build a registry from in-memory `(name, source)` templates.
    ///
    /// # Errors
    ///
    /// Returns an error if a template fails to parse.
    pub fn from_templates<'a>(templates: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut registry = Handlebars::new();
        for (name, source) in templates {
            registry
                .register_template_string(name, source)
                .with_context(|| format!("invalid template {name}"))?;
        }
        Ok(Self::from_registry(registry))
    }

    fn from_registry(registry: Handlebars<'static>) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Render view `name` with `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Upstream`] if the view is missing or fails to
    /// render.
    pub fn render(&self, name: &str, context: &ViewContext) -> Result<Html<String>, ServiceError> {
        self.registry
            .render(name, context)
            .map(Html)
            .map_err(|e| ServiceError::upstream(format!("failed to render view {name}: {e}")))
    }
}
