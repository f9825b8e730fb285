// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging
// 3. Build the overlay collaborator (live bridge or replayed topology)
// 4. Run the crawl and write the results file
// 5. Exit with proper code (0 = success, 2 = error)
// =============================================================================

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, CrawlArgs};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ygg_crawler::crawl;
use ygg_crawler::overlay::{HttpBridge, Overlay, ReplayOverlay};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Live {
            bridge_url,
            min_table_entries,
            bootstrap_interval_secs,
            call_timeout_secs,
            crawl: args,
        } => {
            setup_logging(args.verbose);
            println!("🔍 Crawling through bridge: {}", bridge_url);

            let bridge = HttpBridge::new(&bridge_url, call_timeout_secs.map(Duration::from_secs))?;
            crawl::wait_for_bootstrap(
                &bridge,
                min_table_entries,
                Duration::from_secs(bootstrap_interval_secs),
            )
            .await?;

            handle_crawl(Arc::new(bridge), &args).await
        }
        Commands::Replay {
            topology,
            crawl: args,
        } => {
            setup_logging(args.verbose);
            println!("🔍 Replaying topology: {}", topology.display());

            let replay = Arc::new(ReplayOverlay::from_file(&topology).await?);
            let code = handle_crawl(Arc::clone(&replay) as Arc<dyn Overlay>, &args).await?;
            info!(pings = replay.total_pings(), "replay finished");
            Ok(code)
        }
    }
}

// Runs one crawl and writes its results
async fn handle_crawl(overlay: Arc<dyn Overlay>, args: &CrawlArgs) -> Result<i32> {
    let crawler = crawl::Crawler::new(overlay, args.retry_policy());
    let snapshot = crawler.run().await?;

    snapshot.write(&args.file).await?;
    println!("💾 Results written to {}", args.file.display());

    if args.json {
        println!("{}", snapshot.to_json()?);
    }

    snapshot.print_summary();
    Ok(0)
}

fn setup_logging(verbose: bool) {
    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("ygg_crawler=debug,warn")
        } else {
            EnvFilter::new("ygg_crawler=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
