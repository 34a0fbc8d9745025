//! A small evaluator for TOML configuration documents.
//!
//! ```toml
//! dir = "${data.template_dir.migrations.url}"
//!
//! [variable.tenant]
//! type = "string"
//!
//! [atlas.cloud]
//! url = "https://api.example.io"
//! token = "${atlas.token}"
//!
//! [data.template_dir.migrations]
//! path = "migrations"
//! vars = { Schema = "${var.tenant}" }
//! ```
//!
//! Evaluation runs in a fixed order: variables, then the `atlas.cloud`
//! block, then every data block (dependencies first, each resolved once),
//! and finally the remaining top-level keys, which form the output.

mod document;
pub mod expr;

pub use document::{DataBlock, Document, EvalOptions, Evaluation, VarType, Variable};

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::registry::DataSourceRegistry;

/// Parse and evaluate a document in one step.
pub async fn eval<T: DeserializeOwned>(
    source: &str,
    registry: &DataSourceRegistry,
    options: EvalOptions,
) -> Result<Evaluation<T>> {
    Document::parse(source)?.eval(registry, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::{Value, json};

    async fn run(source: &str, options: EvalOptions) -> Result<Value> {
        let registry = DataSourceRegistry::offline();
        Ok(eval::<Value>(source, &registry, options).await?.value)
    }

    #[tokio::test]
    async fn variables_defaults_and_coercion() {
        let source = r#"
url = "postgres://${var.name}@localhost:${var.port}"
port = "${var.port}"
debug = "${var.debug}"

[variable.name]
type = "string"

[variable.port]
type = "number"
default = 5432

[variable.debug]
type = "bool"
default = false
"#;
        let value = run(source, EvalOptions::default().var("name", "a8m").var("debug", "true"))
            .await
            .unwrap();
        assert_eq!(
            value,
            json!({ "url": "postgres://a8m@localhost:5432", "port": 5432, "debug": true })
        );

        let err = run(source, EvalOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::MissingVariable(ref n) if n == "name"));

        let err = run(source, EvalOptions::default().var("name", "a8m").var("port", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::VariableType { .. }));
    }

    #[tokio::test]
    async fn data_blocks_resolve_in_dependency_order() {
        let source = r#"
v = "${data.runtimevar.greeting}"

[data.runtimevar.greeting]
url = "constant://?val=${data.runtimevar.name}"

[data.runtimevar.name]
url = "constant://?val=a8m"
"#;
        assert_eq!(run(source, EvalOptions::default()).await.unwrap(), json!({ "v": "a8m" }));
    }

    #[tokio::test]
    async fn cycles_are_rejected() {
        let source = r#"
[data.runtimevar.a]
url = "constant://?val=${data.runtimevar.b}"

[data.runtimevar.b]
url = "constant://?val=${data.runtimevar.a}"
"#;
        let err = run(source, EvalOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::Cycle(_)));
    }

    #[tokio::test]
    async fn unreferenced_blocks_still_run() {
        let source = r#"
v = 1

[data.runtimevar.broken]
url = "constant://?err=boom"
"#;
        let err = run(source, EvalOptions::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "data.runtimevar.broken: reading variable: boom");
    }

    #[tokio::test]
    async fn unknown_data_source_is_fatal() {
        let source = r#"
[data.remote_dir.hello]
name = "hello"
"#;
        let err = run(source, EvalOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::UnknownDataSource { .. }));
    }

    #[tokio::test]
    async fn atlas_namespace_merges_injected_values() {
        let source = r#"
env = "${atlas.env}"
keys = "${keys(atlas.cloud)}"
client = "${atlas.cloud.client}"

[atlas.cloud]
url = "https://${atlas.env}.example.io"
token = "${var.token}"

[variable.token]
type = "string"
"#;
        let value = run(
            source,
            EvalOptions::default()
                .var("token", "t0k3n")
                .inject("atlas", json!({ "env": "dev" })),
        )
        .await
        .unwrap();
        assert_eq!(value, json!({ "env": "dev", "keys": ["client"], "client": true }));
    }

    #[tokio::test]
    async fn cloud_secrets_are_not_reachable() {
        let source = r#"
leak = "${atlas.cloud.token}"

[atlas.cloud]
url = "https://example.io"
token = "t0k3n"
"#;
        let err = run(source, EvalOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::UnknownReference(ref r) if r == "atlas.cloud.token"));
    }

    #[tokio::test]
    async fn missing_cloud_block_is_null() {
        let value = run(r#"cloud = "${atlas.cloud == null}""#, EvalOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!({ "cloud": true }));
    }

    #[test]
    fn repeated_blocks_are_rejected() {
        let err = Document::parse("[[atlas]]\n[[atlas]]\n").unwrap_err();
        assert!(matches!(err, CoreError::Document(_)));
        let err = Document::parse("[[atlas.cloud]]\nurl = \"a\"\n[[atlas.cloud]]\nurl = \"b\"\n").unwrap_err();
        assert!(matches!(err, CoreError::Document(_)));
        let err = Document::parse("[atlas]\n[atlas]\n").unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
    }

    #[tokio::test]
    async fn outputs_decode_into_typed_structs() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Out {
            count: i64,
            names: Vec<String>,
        }
        let source = r#"
count = 2
names = ["a8m", "${atlas.user}"]
"#;
        let registry = DataSourceRegistry::offline();
        let out = eval::<Out>(
            source,
            &registry,
            EvalOptions::default().inject("atlas", json!({ "user": "rotem" })),
        )
        .await
        .unwrap();
        assert_eq!(
            out.value,
            Out {
                count: 2,
                names: vec!["a8m".into(), "rotem".into()],
            }
        );
    }

    #[tokio::test]
    async fn missing_query_value_is_unavailable() {
        let temp = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}", temp.path().join("t.db").display());
        let mut db = atlas_db::driver::open(&url).await.unwrap();
        db.exec("CREATE TABLE t (c TEXT)").await.unwrap();
        db.close().await.unwrap();

        let source = format!(
            r#"
v = "${{data.sql.empty.value}}"

[data.sql.empty]
url = "{url}"
query = "SELECT c FROM t"
"#
        );
        let err = run(&source, EvalOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnavailableAttribute { ref block, ref attribute }
                if block == "data.sql.empty" && attribute == "value"
        ));
    }
}
