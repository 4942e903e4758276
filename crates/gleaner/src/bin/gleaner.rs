// ABOUTME: CLI binary for Gleaner: loads a rule config, fetches the target (or reads a local HTML file), prints JSON.
// ABOUTME: Logs go to stderr through tracing so stdout carries only the extraction result.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use gleaner::{extract_html, Client, ExtractionResult, ScrapeConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gleaner")]
#[command(about = "Extract structured data from a web page using declarative rules")]
struct Args {
    /// JSON config file with `url` and `rules`
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Target URL (overrides `url` from the config)
    #[arg(long = "url")]
    url: Option<String>,

    /// Extract from a local HTML file instead of fetching
    #[arg(long = "html", conflicts_with = "url")]
    html: Option<PathBuf>,

    /// Fail on fetch errors instead of extracting from an empty document
    #[arg(long = "strict")]
    strict: bool,

    /// Output compact JSON instead of pretty
    #[arg(long = "compact")]
    compact: bool,

    /// Output file path (default: stdout)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long = "timeout", default_value_t = 30)]
    timeout: u64,

    /// User-Agent header to send
    #[arg(long = "user-agent")]
    user_agent: Option<String>,

    /// Allow fetching from private/local networks
    #[arg(long = "allow-private-networks")]
    allow_private_networks: bool,

    /// Print elapsed time in ms to stderr
    #[arg(long = "timing")]
    timing: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn format_output(result: &ExtractionResult, compact: bool) -> Result<String> {
    let out = if compact {
        serde_json::to_string(result)?
    } else {
        serde_json::to_string_pretty(result)?
    };
    Ok(out)
}

async fn run(args: &Args) -> Result<ExtractionResult> {
    let config = ScrapeConfig::from_path(&args.config)?;
    info!(
        config = %args.config.display(),
        rules = config.rules.len(),
        depth = config.rules.depth(),
        "loaded rules"
    );

    if let Some(html_path) = &args.html {
        let html = fs::read_to_string(html_path)
            .with_context(|| format!("reading {}", html_path.display()))?;
        return Ok(extract_html(&html, &config.rules));
    }

    let Some(url) = args.url.as_deref().or(config.url.as_deref()) else {
        bail!("no URL given: pass --url, --html, or set \"url\" in the config");
    };

    let mut builder = Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .allow_private_networks(args.allow_private_networks);
    if let Some(ua) = &args.user_agent {
        builder = builder.user_agent(ua);
    }
    let client = builder.build()?;

    if args.strict {
        Ok(client.try_extract(url, &config.rules).await?)
    } else {
        Ok(client.extract(url, &config.rules).await)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let start = Instant::now();
    let outcome = run(&args)
        .await
        .and_then(|result| format_output(&result, args.compact));
    let elapsed = start.elapsed();

    let mut had_error = false;
    match outcome {
        Ok(output_str) => {
            if let Some(output_path) = &args.output {
                if let Err(e) = fs::write(output_path, &output_str) {
                    eprintln!("error writing to {:?}: {}", output_path, e);
                    had_error = true;
                }
            } else {
                println!("{}", output_str);
            }
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            had_error = true;
        }
    }

    if args.timing {
        let _ = writeln!(io::stderr(), "elapsed: {}ms", elapsed.as_millis());
    }

    if had_error {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
