//! Data sources evaluated through whole documents.
//!
//! The remote directory tests run against a local HTTP server that speaks
//! the cloud query endpoint, so no network access is needed.

use std::sync::{Arc, Mutex};

use atlas_core::{CoreError, DataSourceRegistry, EvalOptions, ProviderError, eval};
use atlas_db::migrate::{archive_dir, validate, write_sum_file};
use atlas_db::{Dir, MemDir};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::post;
use axum::{Json, Router};
use base64::{Engine, engine::general_purpose::STANDARD};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde_json::{Value, json};
use tempfile::TempDir;

#[derive(Debug, Deserialize)]
struct DirOutput {
    dir: String,
}

async fn eval_value(source: &str, registry: &DataSourceRegistry) -> Result<Value, CoreError> {
    Ok(eval::<Value>(source, registry, EvalOptions::default()).await?.value)
}

#[tokio::test]
async fn runtimevar_decoders() {
    let registry = DataSourceRegistry::offline();

    let binary = r#"
v = "${data.runtimevar.pass}"

[data.runtimevar.pass]
url = "constant://?val=hello+world&decoder=binary"
"#;
    let err = eval_value(binary, &registry).await.unwrap_err();
    assert_eq!(err.to_string(), r#"data.runtimevar.pass: unsupported decoder: "binary""#);

    let unknown = binary.replace("decoder=binary", "decoder=yaml");
    let err = eval_value(&unknown, &registry).await.unwrap_err();
    assert_eq!(err.to_string(), r#"data.runtimevar.pass: unknown decoder: "yaml""#);

    for url in [
        "constant://?val=hello+world",
        "constant://?val=hello+world&decoder=string",
    ] {
        let source = format!(
            r#"
v = "${{data.runtimevar.pass}}"

[data.runtimevar.pass]
url = "{url}"
"#
        );
        assert_eq!(
            eval_value(&source, &registry).await.unwrap(),
            json!({ "v": "hello world" })
        );
    }
}

#[tokio::test]
async fn runtimevar_from_a_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("password");
    std::fs::write(&path, "s3cr3t").unwrap();

    let source = format!(
        r#"
v = "${{data.runtimevar.pass}}"

[data.runtimevar.pass]
url = "file://{}"
"#,
        path.display()
    );
    let registry = DataSourceRegistry::offline();
    assert_eq!(eval_value(&source, &registry).await.unwrap(), json!({ "v": "s3cr3t" }));
}

#[tokio::test]
async fn sql_query_results() {
    let temp = TempDir::new().unwrap();
    let url = format!("sqlite://{}", temp.path().join("users.db").display());
    let mut db = atlas_db::driver::open(&url).await.unwrap();
    db.exec("CREATE TABLE users (name TEXT, age INTEGER)").await.unwrap();
    db.exec("INSERT INTO users VALUES ('a8m', 30), ('rotem', 29)").await.unwrap();
    db.close().await.unwrap();

    let source = format!(
        r#"
count = "${{data.sql.user.count}}"
value = "${{data.sql.user.value}}"
values = "${{data.sql.user.values}}"

[data.sql.user]
url = "{url}"
query = "SELECT name FROM users WHERE age >= ?"
args = [30]
"#
    );
    let registry = DataSourceRegistry::offline();
    assert_eq!(
        eval_value(&source, &registry).await.unwrap(),
        json!({ "count": 1, "value": "a8m", "values": ["a8m"] })
    );

    let wide = source.replace("SELECT name FROM", "SELECT name, age FROM");
    let err = eval_value(&wide, &registry).await.unwrap_err();
    assert!(err.to_string().starts_with("data.sql.user: "), "{err}");
}

#[tokio::test]
async fn template_dir_renders_a_valid_directory() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("1.sql"),
        "create table {{ .Schema }}.t(c int);\n",
    )
    .unwrap();

    let source = format!(
        r#"
dir = "${{data.template_dir.migrations.url}}"

[variable.tenant]
type = "string"

[data.template_dir.migrations]
path = "{}"
vars = {{ Schema = "${{var.tenant}}" }}
"#,
        temp.path().display()
    );
    let registry = DataSourceRegistry::offline();
    let out = eval::<DirOutput>(&source, &registry, EvalOptions::default().var("tenant", "a8m"))
        .await
        .unwrap();

    assert!(out.value.dir.starts_with("mem://"));
    let dir = out.open_dir(&out.value.dir).unwrap();
    let files = dir.files().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name(), "1.sql");
    assert_eq!(files[0].bytes(), b"create table a8m.t(c int);\n");
    validate(dir.as_ref()).unwrap();
}

#[derive(Clone, Default)]
struct Captured {
    authorization: Arc<Mutex<Option<String>>>,
    body: Arc<Mutex<Option<Value>>>,
}

async fn query(
    State((captured, status, response)): State<(Captured, StatusCode, Value)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    *captured.authorization.lock().unwrap() = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    *captured.body.lock().unwrap() = Some(body);
    (status, Json(response))
}

/// Answer every directory query with `status` and `response`.
async fn serve_response(status: StatusCode, response: Value) -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/api/query", post(query))
        .with_state((captured.clone(), status, response));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), captured)
}

/// Serve `content` as the archive of every directory query.
async fn serve(content: String) -> (String, Captured) {
    serve_response(
        StatusCode::OK,
        json!({ "data": { "dir": { "content": content } } }),
    )
    .await
}

/// Evaluate the remote directory document against `url` and return the
/// error raised by the data source.
async fn remote_dir_error(url: &str) -> ProviderError {
    let registry = DataSourceRegistry::builtin();
    match eval_value(&remote_source(url), &registry).await.unwrap_err() {
        CoreError::DataSource { path, source } => {
            assert_eq!(path, "data.remote_dir.hello");
            source
        }
        other => panic!("expected a data source error, got {other}"),
    }
}

fn remote_source(url: &str) -> String {
    format!(
        r#"
dir = "${{data.remote_dir.hello.url}}"

[atlas.cloud]
url = "{url}"
token = "token"

[data.remote_dir.hello]
name = "hello"
tag = "v1"
"#
    )
}

#[tokio::test]
async fn remote_dir_without_cloud_config() {
    let source = r#"
[data.remote_dir.hello]
name = "hello"
"#;
    let registry = DataSourceRegistry::builtin();
    let err = eval_value(source, &registry).await.unwrap_err();
    assert_eq!(err.to_string(), "data.remote_dir.hello: missing atlas cloud config");
}

#[tokio::test]
async fn remote_dir_fetches_from_the_cloud() {
    let mut remote = MemDir::new();
    remote.write_file("1.sql", b"create table t(c int);").unwrap();
    write_sum_file(&mut remote).unwrap();
    let (url, captured) = serve(STANDARD.encode(archive_dir(&remote).unwrap())).await;

    let registry = DataSourceRegistry::builtin();
    let out = eval::<DirOutput>(&remote_source(&url), &registry, EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(
        captured.authorization.lock().unwrap().as_deref(),
        Some("Bearer token")
    );
    let body = captured.body.lock().unwrap().clone().unwrap();
    assert_eq!(body["variables"], json!({ "name": "hello", "tag": "v1" }));

    let dir = out.open_dir(&out.value.dir).unwrap();
    assert_eq!(dir.files().unwrap(), remote.files().unwrap());
    validate(dir.as_ref()).unwrap();
}

#[tokio::test]
async fn remote_dir_rejects_bad_base64() {
    let (url, _) = serve("not base64!".to_string()).await;
    let err = remote_dir_error(&url).await;
    assert!(matches!(err, ProviderError::Base64(_)), "{err}");
}

#[tokio::test]
async fn remote_dir_rejects_error_statuses() {
    let (url, _) = serve_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "errors": [{ "message": "boom" }] }),
    )
    .await;
    let err = remote_dir_error(&url).await;
    assert!(
        matches!(err, ProviderError::Status { status: 500, ref body } if body.contains("boom")),
        "{err}"
    );
}

#[tokio::test]
async fn remote_dir_rejects_unexpected_bodies() {
    let (url, _) = serve_response(StatusCode::OK, json!({ "data": {} })).await;
    let err = remote_dir_error(&url).await;
    assert!(matches!(err, ProviderError::MalformedResponse(_)), "{err}");
}

#[tokio::test]
async fn remote_dir_rejects_content_that_is_not_an_archive() {
    let (url, _) = serve(STANDARD.encode(vec![b'x'; 1024])).await;
    let err = remote_dir_error(&url).await;
    assert!(matches!(err, ProviderError::Archive(_)), "{err}");
}

#[tokio::test]
async fn published_dirs_belong_to_one_evaluation() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("1.sql"), "create table t(c int);\n").unwrap();
    let source = format!(
        r#"
dir = "${{data.template_dir.migrations.url}}"

[data.template_dir.migrations]
path = "{}"
"#,
        temp.path().display()
    );
    let registry = DataSourceRegistry::offline();
    let first = eval::<DirOutput>(&source, &registry, EvalOptions::default()).await.unwrap();
    let second = eval::<DirOutput>(&source, &registry, EvalOptions::default()).await.unwrap();

    assert_ne!(first.value.dir, second.value.dir);
    assert!(second.open_dir(&first.value.dir).is_none());
    assert!(first.open_dir(&first.value.dir).is_some());
}
