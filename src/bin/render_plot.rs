use clap::{Parser, ValueEnum};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use tonkka_bot::fetcher::{FmiFetcher, DEFAULT_PLACE, DEFAULT_WFS_URL};
use tonkka_bot::plot::PlotRenderer;
use tonkka_bot::tracker::ThresholdTracker;
use tonkka_bot::utils::{format_local, format_temperature};

#[derive(Clone, Copy, ValueEnum)]
enum Series {
    History,
    Forecast,
}

#[derive(Parser)]
#[command(name = "render-plot")]
#[command(about = "Fetch FMI temperatures and write the chart the bot would send", long_about = None)]
struct Cli {
    /// Which series to plot
    #[arg(value_enum, default_value = "history")]
    series: Series,

    /// Hours to cover (history: 1-24, forecast: 1-48)
    #[arg(long)]
    hours: Option<u32>,

    /// Output PNG path
    #[arg(short, long, default_value = "plot.png")]
    output: String,

    /// FMI WFS endpoint
    #[arg(long, env, default_value = DEFAULT_WFS_URL)]
    fmi_wfs_url: String,

    /// FMI place name
    #[arg(long, env, default_value = DEFAULT_PLACE)]
    fmi_place: String,

    /// Reference line temperature
    #[arg(long, env, default_value_t = 20.0)]
    threshold_celsius: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();

    let fetcher = FmiFetcher::new(cli.fmi_wfs_url, cli.fmi_place, Duration::from_secs(10))?;
    let (readings, title) = match cli.series {
        Series::History => {
            let hours = cli.hours.unwrap_or(24);
            (fetcher.fetch_history(hours).await?, format!("Edellinen {}h", hours))
        }
        Series::Forecast => {
            let hours = cli.hours.unwrap_or(48);
            (fetcher.fetch_forecast(hours).await?, format!("{}h Ennuste", hours))
        }
    };

    println!("Fetched {} readings", readings.len());
    if let (Some(first), Some(last)) = (readings.first(), readings.last()) {
        println!(
            "  {} {} .. {} {}",
            format_local(first.timestamp),
            format_temperature(first.temperature),
            format_local(last.timestamp),
            format_temperature(last.temperature)
        );
    }

    // Replaying history through a tracker shows whether the window contains a crossing
    let mut tracker = ThresholdTracker::new(cli.threshold_celsius);
    if let Some(event) = readings.iter().find_map(|r| tracker.observe(r)) {
        println!(
            "  first reading at or above {}: {} at {}",
            format_temperature(cli.threshold_celsius),
            format_temperature(event.temperature),
            format_local(event.timestamp)
        );
    }

    let png = PlotRenderer::default().render(&readings, cli.threshold_celsius, &title)?;
    tokio::fs::write(&cli.output, &png).await?;
    println!("Wrote {} bytes to {}", png.len(), cli.output);

    Ok(())
}
