mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;

#[derive(Parser)]
#[command(name = "atlas-ext")]
#[command(about = "Evaluate atlas configuration documents and diff external schemas")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a configuration document and print its outputs as JSON
    Eval {
        /// Document to evaluate
        file: PathBuf,

        /// Input variable, as name=value (repeatable)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Only register data sources that need no network access
        #[arg(long)]
        offline: bool,

        /// Give up after this many seconds (no deadline by default)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Schema inspection
    Schema {
        #[command(subcommand)]
        cmd: SchemaCommands,
    },
    /// Migration directory management
    Migrate {
        #[command(subcommand)]
        cmd: MigrateCommands,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Print the realm of a database as JSON
    Inspect {
        /// Database URL
        #[arg(long, short = 'u')]
        url: String,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Write the migration needed to reach the desired state
    Diff {
        /// Name used in the generated file names
        name: String,

        /// Migration directory
        #[arg(long, env = "ATLAS_DIR", default_value = "migrations")]
        dir: PathBuf,

        /// Migration directory format
        #[arg(long, value_enum, default_value_t = DirFormat::Atlas)]
        dir_format: DirFormat,

        /// Scratch database used to compute the diff
        #[arg(long, env = "ATLAS_DEV_URL")]
        dev_url: String,

        /// Desired state, e.g. ent://schema?globalid=1 (repeatable)
        #[arg(long, required = true)]
        to: Vec<String>,

        /// Indentation for multi-line statements
        #[arg(long, default_value = "")]
        indent: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirFormat {
    Atlas,
    GolangMigrate,
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got {s:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))?;
    miette::set_panic_hook();
    let cli = Cli::parse();

    use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = if cli.debug {
        EnvFilter::new("atlas_core=debug,atlas_db=debug,atlas_cli=debug,sqlx=info,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let terminal_layer = if cli.debug {
        fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .pretty()
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .compact()
            .boxed()
    };

    tracing_subscriber::registry()
        .with(terminal_layer.with_filter(env_filter))
        .init();

    match cli.command {
        Commands::Eval {
            file,
            vars,
            offline,
            timeout,
        } => commands::eval::run(&file, vars, offline, timeout).await,
        Commands::Schema { cmd } => match cmd {
            SchemaCommands::Inspect { url } => commands::schema::inspect(&url).await,
        },
        Commands::Migrate { cmd } => match cmd {
            MigrateCommands::Diff {
                name,
                dir,
                dir_format,
                dev_url,
                to,
                indent,
            } => {
                commands::migrate::diff(commands::migrate::DiffArgs {
                    name: &name,
                    dir: &dir,
                    golang_migrate: dir_format == DirFormat::GolangMigrate,
                    dev_url: &dev_url,
                    to: &to,
                    indent: &indent,
                })
                .await
            }
        },
    }
}
