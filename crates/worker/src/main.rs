//! `gendispatch-worker` -- dispatch one generation job from the command line.
//!
//! ```text
//! gendispatch-worker [--serverless-only] [--async] [--pod-url URL] <mode> [payload.json]
//! ```
//!
//! Reads the JSON payload from the given file, or stdin when omitted, and
//! prints the terminal job record as JSON on stdout. Job failures are part
//! of the record; only configuration problems exit non-zero.
//!
//! Configuration comes from the environment (and `.env`); see
//! `gendispatch_core::config` for the recognized variables.

use std::io::Read;

use anyhow::{bail, Context};
use gendispatch_core::config::ConfigResolver;
use gendispatch_core::job::JobPayload;
use gendispatch_worker::{DispatchOptions, Dispatcher};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str =
    "usage: gendispatch-worker [--serverless-only] [--async] [--pod-url URL] <mode> [payload.json]";

struct Args {
    mode: String,
    payload_path: Option<String>,
    options: DispatchOptions,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut options = DispatchOptions::default();
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--serverless-only" => options = options.force_elastic(),
            "--async" => options = options.prefer_async(),
            "--pod-url" => {
                let url = args.next().context("--pod-url needs a value")?;
                options = options.with_pod_base_url(url);
            }
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(mode) = positional.next() else {
        bail!(USAGE);
    };
    let payload_path = positional.next();
    if positional.next().is_some() {
        bail!("too many arguments\n{USAGE}");
    }

    Ok(Args {
        mode,
        payload_path,
        options,
    })
}

fn read_payload(path: Option<&str>) -> anyhow::Result<JobPayload> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading payload from stdin")?;
            buf
        }
    };
    let body = serde_json::from_str(&raw).context("payload is not valid JSON")?;
    Ok(JobPayload::new(body))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gendispatch_worker=info,gendispatch_cloud=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let payload = read_payload(args.payload_path.as_deref())?;

    let dispatcher = Dispatcher::from_resolver(&ConfigResolver::from_env())
        .context("invalid configuration")?;

    tracing::info!(mode = %args.mode, "Dispatching job");
    let record = dispatcher
        .dispatch(&args.mode, &payload, &args.options)
        .await
        .context("invalid configuration")?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
