//! Registry of data sources.
//!
//! Data sources are written against the typed [`DataSource`] trait and stored
//! behind [`DynamicDataSource`], which decodes the block's attributes into the
//! source's own attribute struct before calling it.
//!
//! # Example
//!
//! ```ignore
//! use atlas_core::registry::DataSourceRegistry;
//!
//! let mut registry = DataSourceRegistry::offline();
//! registry.register(MyDataSource::default());
//! ```

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::context::EvalContext;
use crate::error::{CoreError, ProviderError, Result};
use crate::providers::{QueryData, RemoteDir, RuntimeVar, TemplateDir};

/// A data source with typed attributes.
#[async_trait]
pub trait DataSource: Send + Sync + Debug {
    /// Attributes of a block of this type.
    type Attrs: DeserializeOwned + Send;

    /// Type name used in `data.<type>.<label>` blocks.
    fn name(&self) -> &'static str;

    /// Resolve one block.
    async fn resolve(
        &self,
        attrs: Self::Attrs,
        ctx: &mut EvalContext,
    ) -> std::result::Result<Value, ProviderError>;
}

/// Type-erased data source, as stored in the registry.
#[async_trait]
pub trait DynamicDataSource: Send + Sync + Debug {
    fn name(&self) -> &str;

    async fn resolve_value(
        &self,
        attrs: Value,
        ctx: &mut EvalContext,
    ) -> std::result::Result<Value, ProviderError>;
}

#[derive(Debug)]
struct DataSourceAdapter<S> {
    inner: S,
}

#[async_trait]
impl<S> DynamicDataSource for DataSourceAdapter<S>
where
    S: DataSource,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn resolve_value(
        &self,
        attrs: Value,
        ctx: &mut EvalContext,
    ) -> std::result::Result<Value, ProviderError> {
        let attrs: S::Attrs = serde_json::from_value(attrs).map_err(ProviderError::Attributes)?;
        self.inner.resolve(attrs, ctx).await
    }
}

/// String-keyed set of data sources, populated at start-up.
#[derive(Debug, Default)]
pub struct DataSourceRegistry {
    sources: HashMap<String, Box<dyn DynamicDataSource>>,
}

impl DataSourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in data source.
    pub fn builtin() -> Self {
        let mut registry = Self::offline();
        registry.register(RemoteDir);
        registry
    }

    /// Built-in data sources that never reach the cloud API.
    pub fn offline() -> Self {
        let mut registry = Self::new();
        registry.register(RuntimeVar);
        registry.register(QueryData);
        registry.register(TemplateDir);
        registry
    }

    /// Register a typed data source, replacing any source with the same name.
    pub fn register<S: DataSource + 'static>(&mut self, source: S) {
        self.register_dynamic(Box::new(DataSourceAdapter { inner: source }));
    }

    /// Register a type-erased data source.
    pub fn register_dynamic(&mut self, source: Box<dyn DynamicDataSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn get(&self, name: &str) -> Option<&dyn DynamicDataSource> {
        self.sources.get(name).map(|s| s.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve the block `data.<type_name>.<label>`.
    ///
    /// Errors raised by the data source are prefixed with the block path.
    pub async fn resolve(
        &self,
        type_name: &str,
        label: &str,
        attrs: Value,
        ctx: &mut EvalContext,
    ) -> Result<Value> {
        let source = self.get(type_name).ok_or_else(|| CoreError::UnknownDataSource {
            type_name: type_name.to_string(),
            available: self.names().into_iter().map(str::to_owned).collect(),
        })?;
        let path = format!("data.{type_name}.{label}");
        debug!(block = %path, "resolving data source");
        source
            .resolve_value(attrs, ctx)
            .await
            .map_err(|err| CoreError::DataSource { path, source: err })
    }
}
