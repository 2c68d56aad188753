//! esdump - bulk export past the search result window.
//!
//! # Usage
//!
//! ```bash
//! esdump export -i 'logs-*' -t @timestamp --start 2024-11-01 --end 2024-11-08 \
//!     --step 6h -o logs.csv
//! esdump count -i 'logs-*' -t @timestamp --start 2024-11-01 --end 2024-11-08
//! ```

use tracing::Level;

use esdump::cli::CliInterface;
use esdump::error::Result;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);
    cli.run().await
}

/// Initialize logging system based on verbosity level
fn initialize_logging(cli: &CliInterface) {
    let level = if cli.args().very_verbose {
        Level::TRACE
    } else if cli.args().verbose {
        Level::DEBUG
    } else {
        cli.config().logging.level.to_tracing_level()
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
