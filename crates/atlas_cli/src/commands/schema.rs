//! `atlas-ext schema inspect`

use miette::{IntoDiagnostic, Result};

pub async fn inspect(url: &str) -> Result<()> {
    let mut driver = atlas_db::driver::open(url).await?;
    let realm = driver.inspect_realm().await;
    driver.close().await?;

    let json = serde_json::to_string_pretty(&realm?).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
