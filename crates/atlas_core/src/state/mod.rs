//! Schema-state loaders and differs, routed by URL scheme.
//!
//! A loader turns an external schema definition (for example `ent://schema`)
//! into a [`Realm`] by applying it to a dev database. A differ goes one step
//! further and writes the migration files that bring a migration directory
//! up to that state.
//!
//! Some schemes can be loaded in any form but only diffed when a
//! discriminator parameter is present, e.g. `ent://schema?globalid=1`.

mod ent;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use atlas_db::{Dir, Driver, Realm};
use tracing::debug;
use url::Url;

use crate::error::{CoreError, Result};

pub use ent::{EntSource, GLOBAL_ID};

/// Inputs of [`StateLoader::load_state`].
pub struct LoadOptions<'a> {
    /// Scratch database the definition is applied to. Every change is rolled
    /// back before returning.
    pub dev: &'a mut dyn Driver,
    pub urls: &'a [Url],
}

/// Inputs of [`Differ::migrate_diff`].
pub struct DiffOptions<'a> {
    /// Name used in the generated file names.
    pub name: &'a str,
    /// Indentation for multi-line statements; empty keeps one line each.
    pub indent: &'a str,
    pub dev: &'a mut dyn Driver,
    pub dir: &'a mut dyn Dir,
    /// Desired state.
    pub to: &'a [Url],
}

#[async_trait]
pub trait StateLoader: Send + Sync + Debug {
    async fn load_state(&self, opts: LoadOptions<'_>) -> Result<Realm>;
}

#[async_trait]
pub trait Differ: Send + Sync + Debug {
    /// Write the migration files needed to reach `opts.to`. Returns the names
    /// of the files written, none if the directory is already up to date.
    async fn migrate_diff(&self, opts: DiffOptions<'_>) -> Result<Vec<String>>;
}

#[derive(Debug)]
struct DifferEntry {
    differ: Arc<dyn Differ>,
    requires: Option<&'static str>,
}

#[derive(Debug, Default)]
pub struct StateRegistry {
    loaders: HashMap<String, Arc<dyn StateLoader>>,
    differs: HashMap<String, DifferEntry>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in schema source.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let ent = Arc::new(EntSource);
        registry.register_loader(ent::SCHEME, ent.clone());
        registry.register_differ(ent::SCHEME, ent, Some(GLOBAL_ID));
        registry
    }

    pub fn register_loader(&mut self, scheme: &str, loader: Arc<dyn StateLoader>) {
        self.loaders.insert(scheme.to_string(), loader);
    }

    /// Register a differ. When `requires` is set, the differ is only handed
    /// out for URLs carrying that query parameter with a truthy value.
    pub fn register_differ(
        &mut self,
        scheme: &str,
        differ: Arc<dyn Differ>,
        requires: Option<&'static str>,
    ) {
        self.differs
            .insert(scheme.to_string(), DifferEntry { differ, requires });
    }

    /// The loader for the scheme of the first URL.
    pub fn loader(&self, urls: &[Url]) -> Option<&dyn StateLoader> {
        let url = urls.first()?;
        self.loaders.get(url.scheme()).map(|l| l.as_ref())
    }

    /// The differ for the scheme of the first URL, if it supports this URL.
    pub fn differ(&self, urls: &[Url]) -> Option<&dyn Differ> {
        let url = urls.first()?;
        let entry = self.differs.get(url.scheme())?;
        if let Some(param) = entry.requires {
            if !has_flag(url, param) {
                debug!(scheme = url.scheme(), param, "differ requires a missing parameter");
                return None;
            }
        }
        Some(entry.differ.as_ref())
    }

    /// Load the state described by `urls`.
    pub async fn load_state(&self, dev: &mut dyn Driver, urls: &[Url]) -> Result<Realm> {
        let first = urls.first().ok_or(CoreError::NoSchemaUrl)?;
        let loader = self
            .loader(urls)
            .ok_or_else(|| CoreError::NoLoader(first.scheme().to_string()))?;
        loader.load_state(LoadOptions { dev, urls }).await
    }

    /// Diff a migration directory against the state described by `opts.to`.
    pub async fn migrate_diff(&self, opts: DiffOptions<'_>) -> Result<Vec<String>> {
        let first = opts.to.first().ok_or(CoreError::NoSchemaUrl)?;
        let differ = self
            .differ(opts.to)
            .ok_or_else(|| CoreError::NoDiffer(first.to_string()))?;
        differ.migrate_diff(opts).await
    }
}

fn has_flag(url: &Url, param: &str) -> bool {
    url.query_pairs()
        .any(|(k, v)| k == param && !matches!(v.as_ref(), "" | "0" | "false"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(s: &str) -> Vec<Url> {
        vec![Url::parse(s).unwrap()]
    }

    #[test]
    fn differ_needs_the_discriminator() {
        let registry = StateRegistry::builtin();

        let plain = urls("ent://schema");
        assert!(registry.loader(&plain).is_some());
        assert!(registry.differ(&plain).is_none());

        assert!(registry.differ(&urls("ent://schema?globalid=0")).is_none());
        assert!(registry.differ(&urls("ent://schema?globalid=1")).is_some());
    }

    #[test]
    fn unknown_schemes_have_nothing() {
        let registry = StateRegistry::builtin();
        let other = urls("hcl://schema.hcl");
        assert!(registry.loader(&other).is_none());
        assert!(registry.differ(&other).is_none());
        assert!(registry.loader(&[]).is_none());
    }
}
