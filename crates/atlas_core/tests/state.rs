//! Loading and diffing the `ent` fixtures in `tests/fixtures/ent/schema`
//! against an in-memory sqlite dev database.

use atlas_core::{CoreError, DiffOptions, StateRegistry};
use atlas_db::migrate::validate;
use atlas_db::{Dir, Driver, GolangMigrateDir, LocalDir, MemDir};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use url::Url;

fn schema_url(query: &str) -> Url {
    Url::parse(&format!(
        "ent://{}/tests/fixtures/ent/schema{query}",
        env!("CARGO_MANIFEST_DIR")
    ))
    .unwrap()
}

async fn dev() -> Box<dyn Driver> {
    atlas_db::driver::open("sqlite://:memory:").await.unwrap()
}

async fn diff(dev: &mut dyn Driver, dir: &mut dyn Dir) -> Result<Vec<String>, CoreError> {
    let to = vec![schema_url("?globalid=1")];
    StateRegistry::builtin()
        .migrate_diff(DiffOptions {
            name: "boring",
            indent: "\t",
            dev,
            dir,
            to: &to,
        })
        .await
}

#[tokio::test]
async fn loads_without_the_discriminator() {
    let registry = StateRegistry::builtin();
    let urls = vec![schema_url("")];
    assert!(registry.differ(&urls).is_none());

    let mut dev = dev().await;
    let realm = registry.load_state(dev.as_mut(), &urls).await.unwrap();
    let tables: Vec<&str> = realm.tables().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, ["atlas_schema_revisions", "users"]);

    let users = realm.schema("main").unwrap().table("users").unwrap();
    assert_eq!(users.primary_key, vec!["id"]);
    assert!(users.column("age").unwrap().nullable);

    // Everything applied to the dev database is rolled back.
    assert_eq!(dev.inspect_realm().await.unwrap().tables().count(), 0);
}

#[tokio::test]
async fn diffing_needs_the_discriminator() {
    let mut dev = dev().await;
    let mut dir = MemDir::new();
    let to = vec![schema_url("")];
    let err = StateRegistry::builtin()
        .migrate_diff(DiffOptions {
            name: "boring",
            indent: "",
            dev: dev.as_mut(),
            dir: &mut dir,
            to: &to,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NoDiffer(_)));
    assert!(dir.is_empty());
}

#[tokio::test]
async fn diff_into_memory() {
    let mut dev = dev().await;
    let mut dir = MemDir::new();
    let written = diff(dev.as_mut(), &mut dir).await.unwrap();

    assert_eq!(written.len(), 1);
    assert!(written[0].ends_with("_boring.sql"), "{}", written[0]);
    let content = String::from_utf8(dir.read_file(&written[0]).unwrap().unwrap()).unwrap();
    assert!(
        content.contains("CREATE TABLE `atlas_schema_revisions` (\n\t`version` text NOT NULL"),
        "{content}"
    );
    validate(&dir).unwrap();
}

#[tokio::test]
async fn second_diff_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    let mut dir = LocalDir::open(temp.path()).unwrap();
    let mut dev = dev().await;

    assert_eq!(diff(dev.as_mut(), &mut dir).await.unwrap().len(), 1);
    assert!(diff(dev.as_mut(), &mut dir).await.unwrap().is_empty());
    assert_eq!(dir.files().unwrap().len(), 1);
}

#[tokio::test]
async fn diff_into_golang_migrate() {
    let temp = TempDir::new().unwrap();
    let mut dir = GolangMigrateDir::open(temp.path()).unwrap();
    let mut dev = dev().await;

    let mut written = diff(dev.as_mut(), &mut dir).await.unwrap();
    written.sort();
    assert_eq!(written.len(), 2);
    assert!(written[0].ends_with("_boring.down.sql"), "{}", written[0]);
    assert!(written[1].ends_with("_boring.up.sql"), "{}", written[1]);

    let down = std::fs::read_to_string(temp.path().join(&written[0])).unwrap();
    assert!(down.contains("DROP TABLE `users`"), "{down}");
    assert!(temp.path().join("atlas.sum").exists());
}
