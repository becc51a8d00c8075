//! shiptrack - Entry point
//!
//! Usage: shiptrack [BOOKING_ID]

use shiptrack::{Config, GeminiClient, Tracker};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Demonstration booking ID used when none is given
const DEFAULT_BOOKING_ID: &str = "SINI25432400";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("shiptrack v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: shiptrack [BOOKING_ID]");
        println!();
        println!("Retrieves voyage and arrival data for an HMM booking ID.");
        println!();
        println!("Environment variables:");
        println!("  GEMINI_API_KEY          Gemini API key (required)");
        println!("  SHIPTRACK_MODEL         Model name (default: gemini-2.0-flash)");
        println!("  SHIPTRACK_TRACE_DIR     Trace directory (default: traces)");
        println!("  SHIPTRACK_MAX_STEPS     Agent step budget (default: 20)");
        println!("  SHIPTRACK_HTTP_TIMEOUT  Page fetch timeout in seconds (default: 30)");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let booking_id = args
        .iter()
        .skip(1)
        .find(|a| !a.starts_with('-'))
        .map(String::as_str)
        .unwrap_or(DEFAULT_BOOKING_ID);

    info!("shiptrack v{} tracking booking {}", env!("CARGO_PKG_VERSION"), booking_id);

    let config = Config::from_env()?;
    let model = GeminiClient::from_config(&config);
    let tracker = Tracker::new(config, model);

    let outcome = tracker.fetch(booking_id).await?;
    println!("Results: {}", outcome);

    Ok(())
}
