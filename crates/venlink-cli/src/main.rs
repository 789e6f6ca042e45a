use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tracing_subscriber::EnvFilter;

use venlink_core::report::{incremental_fn, MeasurementSpec, ReportSpec, SampleOutput};
use venlink_core::{VenClient, VenConfig};

/// Headless OpenADR 2.0b VEN client.
#[derive(Parser)]
#[command(name = "venlink-cli", version)]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// VEN name; overrides the config file.
    #[arg(long)]
    ven_name: Option<String>,

    /// VTN URL; overrides the config file.
    #[arg(long)]
    vtn_url: Option<String>,

    /// Register a demo voltage report backed by a random-walk sampler.
    #[arg(long)]
    demo_report: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => VenConfig::from_file(path).await?,
        None => VenConfig::default(),
    };
    if let Some(ven_name) = cli.ven_name {
        config.ven_name = ven_name;
    }
    if let Some(vtn_url) = cli.vtn_url {
        config.vtn_url = vtn_url.trim_end_matches('/').to_string();
    }
    if config.ven_name.is_empty() || config.vtn_url.is_empty() {
        return Err("a ven_name and a vtn_url are required (flags or config file)".into());
    }

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let client = VenClient::new(config)?;

    if cli.demo_report {
        let level = Arc::new(Mutex::new(230.0_f64));
        client.add_report(
            ReportSpec::new("demo-meter")
                .measurement(MeasurementSpec::Code("voltage".to_string()))
                .report_duration(Duration::from_secs(3600)),
            incremental_fn(move || {
                let level = Arc::clone(&level);
                async move {
                    let mut level = level.lock().unwrap();
                    *level += rand::thread_rng().gen_range(-0.5..0.5);
                    Ok(SampleOutput::Scalar(*level))
                }
            }),
        )?;
    }

    client.run().await?;
    tracing::info!("VEN is running; press ctrl-c to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            client.stop().await;
        }
        _ = client.wait_until_stopped() => {}
    }
    Ok(())
}
