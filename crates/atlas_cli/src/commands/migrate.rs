//! `atlas-ext migrate diff`: write the migration that brings a directory up
//! to an external schema.

use std::path::Path;

use atlas_core::{DiffOptions, StateRegistry};
use atlas_db::{Dir, GolangMigrateDir, LocalDir};
use miette::{IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use url::Url;

pub struct DiffArgs<'a> {
    pub name: &'a str,
    pub dir: &'a Path,
    pub golang_migrate: bool,
    pub dev_url: &'a str,
    pub to: &'a [String],
    pub indent: &'a str,
}

pub async fn diff(args: DiffArgs<'_>) -> Result<()> {
    let to = args
        .to
        .iter()
        .map(|u| Url::parse(u))
        .collect::<Result<Vec<_>, _>>()
        .into_diagnostic()?;

    if !args.dir.exists() {
        tokio::fs::create_dir_all(args.dir).await.into_diagnostic()?;
    }
    let mut dir: Box<dyn Dir> = if args.golang_migrate {
        Box::new(GolangMigrateDir::open(args.dir)?)
    } else {
        Box::new(LocalDir::open(args.dir)?)
    };

    let registry = StateRegistry::builtin();
    let mut dev = atlas_db::driver::open(args.dev_url).await?;
    let written = registry
        .migrate_diff(DiffOptions {
            name: args.name,
            indent: args.indent,
            dev: dev.as_mut(),
            dir: dir.as_mut(),
            to: &to,
        })
        .await;
    dev.close().await?;

    let written = written?;
    if written.is_empty() {
        println!(
            "{}",
            "The migration directory is synced with the desired state, no changes to be made"
                .green()
        );
    }
    for name in written {
        println!("{} {}", "wrote".green(), args.dir.join(name).display().bright_cyan());
    }
    Ok(())
}
