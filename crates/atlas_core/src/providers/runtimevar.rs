//! `runtimevar`: read a configuration value from a URL.
//!
//! ```toml
//! [data.runtimevar.pass]
//! url = "env://DB_PASSWORD?decoder=string"
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::context::EvalContext;
use crate::error::ProviderError;
use crate::registry::DataSource;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeVarAttrs {
    pub url: String,
}

/// Decoders applied to the raw variable bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    String,
    Binary,
}

impl FromStr for Decoder {
    type Err = ProviderError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "string" => Ok(Self::String),
            "binary" => Ok(Self::Binary),
            other => Err(ProviderError::UnknownDecoder(other.to_string())),
        }
    }
}

impl Decoder {
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Binary => "binary",
        }
    }

    /// Reject decoders that are known but not implemented.
    fn check(self) -> Result<Self, ProviderError> {
        match self {
            Self::String => Ok(self),
            Self::Binary => Err(ProviderError::UnsupportedDecoder(self.name().to_string())),
        }
    }

    fn decode(self, raw: Vec<u8>) -> Result<Value, ProviderError> {
        match self {
            Self::String => String::from_utf8(raw)
                .map(Value::String)
                .map_err(|e| ProviderError::DecodeVariable(e.to_string())),
            Self::Binary => Err(ProviderError::UnsupportedDecoder(self.name().to_string())),
        }
    }
}

/// Query parameters shared by every scheme.
#[derive(Debug, Default, Deserialize)]
struct Params {
    decoder: Option<String>,
    val: Option<String>,
    err: Option<String>,
}

/// Backing store selected by the URL scheme.
#[derive(Debug)]
enum Resolver {
    Constant { val: String, err: Option<String> },
    Env(String),
    File(PathBuf),
}

impl Resolver {
    fn open(url: &Url, params: &Params) -> Result<Self, ProviderError> {
        let fail = |reason: &str| ProviderError::OpenVariable {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        match url.scheme() {
            "constant" => Ok(Self::Constant {
                val: params.val.clone().unwrap_or_default(),
                err: params.err.clone(),
            }),
            "env" => {
                let name = url.host_str().unwrap_or_default();
                if name.is_empty() {
                    return Err(fail("missing environment variable name"));
                }
                Ok(Self::Env(name.to_string()))
            }
            "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|_| fail("expected an absolute file path")),
            other => Err(fail(&format!("unsupported scheme {other:?}"))),
        }
    }

    async fn read(&self) -> Result<Vec<u8>, ProviderError> {
        match self {
            Self::Constant { err: Some(err), .. } => Err(ProviderError::ReadVariable(err.clone())),
            Self::Constant { val, .. } => Ok(val.clone().into_bytes()),
            Self::Env(name) => std::env::var(name)
                .map(String::into_bytes)
                .map_err(|e| ProviderError::ReadVariable(format!("{name}: {e}"))),
            Self::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| ProviderError::ReadVariable(format!("{}: {e}", path.display()))),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RuntimeVar;

#[async_trait]
impl DataSource for RuntimeVar {
    type Attrs = RuntimeVarAttrs;

    fn name(&self) -> &'static str {
        "runtimevar"
    }

    async fn resolve(
        &self,
        attrs: RuntimeVarAttrs,
        _ctx: &mut EvalContext,
    ) -> Result<Value, ProviderError> {
        let url = Url::parse(&attrs.url).map_err(|e| ProviderError::OpenVariable {
            url: attrs.url.clone(),
            reason: e.to_string(),
        })?;
        let params: Params = serde_urlencoded::from_str(url.query().unwrap_or_default())
            .map_err(|e| ProviderError::OpenVariable {
                url: attrs.url.clone(),
                reason: e.to_string(),
            })?;
        let decoder = match params.decoder.as_deref() {
            Some(name) => name.parse::<Decoder>()?.check()?,
            None => Decoder::String,
        };
        let resolver = Resolver::open(&url, &params)?;
        let raw = resolver.read().await?;
        decoder.decode(raw)
    }
}
