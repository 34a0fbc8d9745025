//! `remote_dir`: fetch a migration directory from the cloud API.
//!
//! ```toml
//! [atlas.cloud]
//! url = "https://api.example.io"
//! token = "${var.cloud_token}"
//!
//! [data.remote_dir.app]
//! name = "app"
//! tag = "v1"
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::EvalContext;
use crate::error::ProviderError;
use crate::registry::DataSource;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteDirAttrs {
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteDir;

#[async_trait]
impl DataSource for RemoteDir {
    type Attrs = RemoteDirAttrs;

    fn name(&self) -> &'static str {
        "remote_dir"
    }

    async fn resolve(
        &self,
        attrs: RemoteDirAttrs,
        ctx: &mut EvalContext,
    ) -> Result<Value, ProviderError> {
        let client = ctx
            .cloud()
            .ok_or(ProviderError::MissingCloudConfig)?
            .client()?;
        let dir = client.dir(&attrs.name, attrs.tag.as_deref()).await?;
        let url = ctx.dirs_mut().publish(dir);
        Ok(json!({ "url": url }))
    }
}
