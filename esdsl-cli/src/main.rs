use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use esdsl::{AdhocFilter, CompiledQuery, Config, QueryCompiler, QuerySpec, TermsLookup, TimeZone};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "esdsl")]
#[command(about = "Compile dashboard queries to Elasticsearch query DSL")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "ESDSL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a panel target into a search body
    Build {
        /// Target JSON file, or "-" for stdin
        #[arg(short, long, default_value = "-")]
        spec: String,

        /// JSON file with an array of ad-hoc {key, value} filters
        #[arg(long)]
        adhoc: Option<PathBuf>,

        #[command(flatten)]
        datasource: DatasourceArgs,

        /// Timezone preference for date histograms
        #[arg(long, value_enum)]
        timezone: Option<TimezoneArg>,

        /// Resolved zone name used with the browser preference
        #[arg(long)]
        tz_name: Option<String>,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Build the query listing distinct values of a field
    Terms {
        /// Field to list values of
        #[arg(short, long)]
        field: String,

        /// Lucene query narrowing the candidate documents
        #[arg(short, long)]
        query: Option<String>,

        #[command(flatten)]
        datasource: DatasourceArgs,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Write the default configuration file
    InitConfig {
        /// Destination (defaults to ~/.esdsl/config.toml)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct DatasourceArgs {
    /// Document field holding the event timestamp
    #[arg(long)]
    time_field: Option<String>,

    /// Elasticsearch major version
    #[arg(long)]
    es_version: Option<u32>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TimezoneArg {
    Browser,
    Utc,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    init_tracing(&config);

    match cli.command {
        Commands::Build {
            spec,
            adhoc,
            datasource,
            timezone,
            tz_name,
            pretty,
        } => {
            let raw = read_input(&spec)?;
            let target = QuerySpec::from_json(&raw)
                .with_context(|| format!("Failed to parse query spec from {}", spec))?;

            let filters = match &adhoc {
                Some(path) => Some(
                    AdhocFilter::list_from_json(&read_input(&path.to_string_lossy())?)
                        .with_context(|| format!("Failed to parse ad-hoc filters from {}", path.display()))?,
                ),
                None => None,
            };

            let compiler = compiler_for(&config, &datasource, Some(&target));
            let time_zone = resolve_time_zone(&config, timezone, tz_name);
            tracing::info!(
                time_field = compiler.time_field(),
                es_version = compiler.es_version(),
                browser_tz = time_zone.is_browser(),
                "Building query"
            );

            let query = compiler.build_with_timezone(&target, filters.as_deref(), &time_zone)?;
            print_query(&query, pretty);
        }
        Commands::Terms {
            field,
            query,
            datasource,
            pretty,
        } => {
            let mut lookup = TermsLookup::new(field);
            if let Some(q) = query {
                lookup = lookup.with_query(q);
            }
            let compiler = compiler_for(&config, &datasource, None);
            print_query(&compiler.terms_query(&lookup), pretty);
        }
        Commands::InitConfig { path } => {
            let path = match path {
                Some(p) => esdsl::config::expand_tilde(&p)?,
                None => Config::default_path(),
            };
            if path.exists() {
                anyhow::bail!("Config already exists at {}", path.display());
            }
            Config::default()
                .save(&path)
                .with_context(|| format!("Failed to write config {}", path.display()))?;
            tracing::info!("Wrote default config to {}", path.display());
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
    );
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.logging.format.clone());

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Flags win over the target's own settings, which win over the config file
fn compiler_for(config: &Config, args: &DatasourceArgs, target: Option<&QuerySpec>) -> QueryCompiler {
    let time_field = args
        .time_field
        .clone()
        .or_else(|| target.and_then(|t| t.time_field.clone()))
        .unwrap_or_else(|| config.datasource.time_field.clone());
    let es_version = args
        .es_version
        .or_else(|| target.and_then(|t| t.es_version))
        .unwrap_or(config.datasource.es_version);
    QueryCompiler::new(time_field, es_version)
}

fn resolve_time_zone(config: &Config, arg: Option<TimezoneArg>, name: Option<String>) -> TimeZone {
    match arg {
        Some(TimezoneArg::Utc) => TimeZone::Utc,
        Some(TimezoneArg::Browser) => TimeZone::Browser {
            name: name.or_else(|| config.timezone.name.clone()),
        },
        None => match (config.time_zone(), name) {
            (TimeZone::Browser { .. }, Some(name)) => TimeZone::browser(name),
            (tz, _) => tz,
        },
    }
}

fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(Path::new(source)).with_context(|| format!("Failed to read {}", source))
    }
}

fn print_query(query: &CompiledQuery, pretty: bool) {
    if pretty {
        println!("{:#}", query);
    } else {
        println!("{}", query);
    }
}
