//! Built-in data sources.

mod remote_dir;
mod runtimevar;
mod sql;
mod template_dir;

pub use remote_dir::{RemoteDir, RemoteDirAttrs};
pub use runtimevar::{Decoder, RuntimeVar, RuntimeVarAttrs};
pub use sql::{QueryAttrs, QueryData};
pub use template_dir::{TemplateDir, TemplateDirAttrs};
