use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nupeek_feed::{FeedConfig, FeedKind, PackageSource, SourceError};
use nupeek_introspect::{IntrospectError, Introspector};

#[derive(Debug, Parser)]
#[command(name = "nupeek", about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Package source kind: `http` or `fs` (overrides NUPEEK_SOURCE)
    #[arg(long, global = true, value_parser = parse_kind)]
    source: Option<FeedKind>,

    /// Flat-container base URL (overrides NUPEEK_FEED_URL)
    #[arg(long, global = true)]
    feed_url: Option<String>,

    /// Local folder feed root (overrides NUPEEK_FEED_DIR)
    #[arg(long, global = true)]
    feed_dir: Option<PathBuf>,

    /// Directory for cached archives (overrides NUPEEK_CACHE_DIR)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the declaration of an interface type.
    Describe {
        package: String,
        #[arg(value_name = "TYPE")]
        type_name: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// List the public interfaces declared in a package.
    List {
        package: String,
        #[arg(long)]
        version: Option<String>,
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_kind(value: &str) -> Result<FeedKind, String> {
    value.parse().map_err(|err: SourceError| err.to_string())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        let kind = err
            .downcast_ref::<IntrospectError>()
            .map(IntrospectError::kind)
            .unwrap_or("internal");
        let message = format!("{err:#}");
        tracing::error!(kind, error = %message, "nupeek failed");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = feed_config(&cli)?;
    tracing::debug!(
        source = config.kind.as_str(),
        feed_url = %config.feed_url,
        feed_dir = ?config.feed_dir,
        cache_dir = ?config.cache_dir,
        "feed configuration"
    );
    let source = config.build().context("failed to set up package source")?;
    tracing::debug!(source = %source.describe(), "package source ready");
    let introspector = Introspector::new(source);

    match cli.command {
        Commands::Describe {
            package,
            type_name,
            version,
        } => {
            let description =
                introspector.describe_type(&package, &type_name, version.as_deref())?;
            println!("{}", description.text().trim_end());
        }
        Commands::List {
            package,
            version,
            json,
        } => {
            let listing = introspector.list_types(&package, version.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                for ty in &listing.types {
                    let name = if ty.full_name.is_empty() {
                        &ty.name
                    } else {
                        &ty.full_name
                    };
                    println!("{name}");
                }
            }
        }
    }
    Ok(())
}

fn feed_config(cli: &Cli) -> anyhow::Result<FeedConfig> {
    let mut config = FeedConfig::from_env().context("failed to read feed configuration")?;
    if let Some(kind) = cli.source {
        config.kind = kind;
    }
    if let Some(url) = &cli.feed_url {
        config.feed_url = url.clone();
    }
    if let Some(dir) = &cli.feed_dir {
        config.feed_dir = Some(dir.clone());
        if cli.source.is_none() && cli.feed_url.is_none() {
            config.kind = FeedKind::Folder;
        }
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    Ok(config)
}
