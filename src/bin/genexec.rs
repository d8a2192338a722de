//! genexec: command-line front end for the generation execution core.
//!
//! Loads providers from the config file and runs generation requests
//! through the cache/retry/poll pipeline, printing each outcome as JSON.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use genexec::{BuildInfo, Config, Gateway, GenerationRequest, ParamValue, RunOptions};

/// Generation execution core CLI
#[derive(Parser)]
#[command(name = "genexec")]
#[command(version = genexec::PKG_VERSION)]
#[command(about = "Run cached, retried, polled AI media generation requests")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "GENEXEC_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a generation request
    Run {
        /// Provider name as configured under [providers.<name>]
        #[arg(short, long)]
        provider: String,
        /// Model to use
        #[arg(short, long)]
        model: String,
        /// Prompt text
        prompt: String,
        /// Extra parameter, repeatable (e.g. --param size=1024x1024)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
        /// Bypass the result cache
        #[arg(long)]
        no_cache: bool,
        /// Issue the same request N times (later runs hit the cache)
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },

    /// List configured providers
    Providers,

    /// Print build version information
    Version {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Parse `name=value`, inferring bool/int/float before falling back to text.
fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    if name.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    let value = if let Ok(b) = value.parse::<bool>() {
        ParamValue::Bool(b)
    } else if let Ok(i) = value.parse::<i64>() {
        ParamValue::Int(i)
    } else if let Ok(f) = value.parse::<f64>() {
        ParamValue::Float(f)
    } else {
        ParamValue::Text(value.to_string())
    };
    Ok((name.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Command::Version { json } = args.command {
        let info = BuildInfo::current();
        if json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            println!("genexec {info} (built {})", info.built_at);
        }
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let gateway = Gateway::from_config(&config)?;

    match args.command {
        Command::Providers => {
            for name in gateway.registry().names() {
                println!("{name}");
            }
        }
        Command::Run {
            provider,
            model,
            prompt,
            params,
            no_cache,
            repeat,
        } => {
            let request = params
                .into_iter()
                .fold(GenerationRequest::new(provider, model, prompt), |req, (k, v)| {
                    req.param(k, v)
                });
            let options = if no_cache {
                RunOptions::no_cache()
            } else {
                gateway.defaults().clone()
            };

            for _ in 0..repeat.max(1) {
                match gateway.generate_with(&request, &options).await {
                    Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
                    Err(e) => {
                        eprintln!("{}", serde_json::to_string_pretty(&e)?);
                        std::process::exit(1);
                    }
                }
            }
        }
        Command::Version { .. } => {}
    }

    Ok(())
}
