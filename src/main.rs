use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dongmatch::compare::{attach_map, compare_regions, Comparison};
use dongmatch::config::{AppConfig, Credentials, GeocoderBackend};
use dongmatch::data::TableCache;
use dongmatch::geocode::{Geocoder, TokenCache};
use dongmatch::render::{render_comparison, save_chart};
use dongmatch::search::{match_regions, resolve_query, Resolution};
use dongmatch::{server, FinderError, PopulationTable};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// Buckets per line in the terminal summary
const SUMMARY_GROUP: usize = 10;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List regions whose name contains the text (case-insensitive)
    Search {
        text: String,
    },
    /// Find the region with the most similar age structure
    Compare(CompareArgs),
    /// Serve the web front end and JSON API
    Serve,
}

#[derive(Args)]
struct CompareArgs {
    /// Exact region name or a unique fragment of it
    text: String,

    /// Also list this many nearest regions in total
    #[arg(long, default_value_t = 1)]
    top: usize,

    /// Write the age comparison chart as PNG
    #[arg(long, value_name = "FILE")]
    chart: Option<PathBuf>,

    /// Write both map pins as GeoJSON
    #[arg(long, value_name = "FILE")]
    pins: Option<PathBuf>,

    /// Skip geocoding and the map
    #[arg(long)]
    no_map: bool,

    /// Override the configured geocoding back end
    #[arg(long, value_enum)]
    backend: Option<GeocoderBackend>,

    #[arg(long, env = "SGIS_CONSUMER_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "SGIS_CONSUMER_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    #[arg(long, env = "SGIS_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .init();

    let app_config = AppConfig::load_from_file(&cli.config)?;
    let tables = Arc::new(TableCache::new());

    match cli.command {
        Commands::Search { text } => {
            let table = tables.get_or_load(&app_config.input)?;
            let found = match_regions(&table, &text);
            if found.is_empty() {
                bail!("No region matches '{}'", text);
            }
            for record in found {
                println!("{}\t{}", record.name, record.total);
            }
        }
        Commands::Compare(args) => {
            let table = tables.get_or_load(&app_config.input)?;
            run_compare(&app_config, &table, args).await?;
        }
        Commands::Serve => {
            server::start_server(app_config, tables).await?;
        }
    }

    Ok(())
}

async fn run_compare(config: &AppConfig, table: &PopulationTable, args: CompareArgs) -> Result<()> {
    let name = match resolve_query(table, &args.text) {
        Ok(Resolution::Unique(name)) => name,
        Ok(Resolution::Ambiguous(names)) => pick_candidate(&names)?,
        Err(FinderError::NotFound(_)) => bail!("No region matches '{}'. Try `search` first.", args.text),
        Err(e) => return Err(e.into()),
    };

    let mut comparison = compare_regions(table, &name, args.top)?;
    print_comparison(&comparison);

    // Chart first: it never depends on geocoding
    if let Some(path) = &args.chart {
        let img = render_comparison(&config.chart, &comparison.query_proportions, &comparison.matched.proportions)?;
        save_chart(&img, path)?;
        println!("Chart written to {}", path.display());
    }

    if args.no_map {
        return Ok(());
    }

    let mut geocoder_config = config.geocoder.clone();
    if let Some(backend) = args.backend {
        geocoder_config.backend = backend;
    }
    let credentials = geocoder_config.credentials.merged(&Credentials {
        consumer_key: args.api_key,
        consumer_secret: args.api_secret,
        access_token: args.access_token,
    });
    let tokens = Arc::new(TokenCache::new(Duration::from_secs(geocoder_config.token_ttl_secs)));

    match Geocoder::from_config(&geocoder_config, &credentials, tokens) {
        Ok(geocoder) => attach_map(&mut comparison, &geocoder, &config.map).await,
        Err(e) => comparison.skip_map(&e),
    }

    print_map(&comparison);

    if let (Some(path), Some(map)) = (&args.pins, &comparison.map) {
        let geojson = serde_json::to_string_pretty(&map.to_geojson())?;
        std::fs::write(path, geojson)
            .with_context(|| format!("Failed to write pins {:?}", path))?;
        println!("Pins written to {}", path.display());
    }

    Ok(())
}

/// Asks the user to choose one of several matching names. Never guesses.
fn pick_candidate(names: &[String]) -> Result<String> {
    println!("{} regions match:", names.len());
    for (i, name) in names.iter().enumerate() {
        println!("  [{}] {}", i + 1, name);
    }

    if !io::stdin().is_terminal() {
        bail!("Ambiguous region name; re-run with one of the names above");
    }

    print!("Select 1-{}: ", names.len());
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    match line.trim().parse::<usize>() {
        Ok(n) if (1..=names.len()).contains(&n) => Ok(names[n - 1].clone()),
        _ => bail!("No region selected"),
    }
}

fn print_comparison(c: &Comparison) {
    println!("'{}' is most similar to '{}' (L1 distance {:.4})", c.query, c.matched.name, c.matched.distance);
    for (rank, other) in c.runners_up.iter().enumerate() {
        println!("  #{} {} ({:.4})", rank + 2, other.name, other.distance);
    }

    println!();
    println!("{:<16} {:>8} {:>8}", "ages", "query", "match");
    let groups = c
        .labels
        .chunks(SUMMARY_GROUP)
        .zip(c.query_proportions.chunks(SUMMARY_GROUP))
        .zip(c.matched.proportions.chunks(SUMMARY_GROUP));
    for ((labels, q), m) in groups {
        let span = match (labels.first(), labels.last()) {
            (Some(a), Some(b)) if a != b => format!("{}-{}", a, b),
            (Some(a), _) => a.clone(),
            _ => continue,
        };
        let q: f64 = q.iter().sum();
        let m: f64 = m.iter().sum();
        println!("{:<16} {:>7.1}% {:>7.1}%", span, q * 100.0, m * 100.0);
    }
    println!();
}

fn print_map(c: &Comparison) {
    match (&c.map, &c.map_error) {
        (Some(map), _) => {
            println!(
                "Map centre ({:.5}, {:.5}) zoom {}, {:.1} km apart",
                map.center.lat, map.center.lon, map.zoom, map.distance_km
            );
            for pin in &map.pins {
                println!("  {:?} pin: {} ({:.5}, {:.5})", pin.color, pin.name, pin.coordinates.lat, pin.coordinates.lon);
            }
        }
        (None, Some(failure)) => {
            if let Some(field) = failure.missing_credential {
                println!("The map needs a {}: {}", field, credential_hint(field));
            } else {
                println!("Map skipped: {}", failure.message);
            }
        }
        (None, None) => {}
    }
}

fn credential_hint(field: &str) -> &'static str {
    match field {
        "consumer_key" => "pass --api-key or set SGIS_CONSUMER_KEY",
        "consumer_secret" => "pass --api-secret or set SGIS_CONSUMER_SECRET",
        "access_token" => "pass --access-token or set SGIS_ACCESS_TOKEN",
        _ => "add it to the [geocoder] section of the config",
    }
}
