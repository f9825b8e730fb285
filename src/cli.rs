// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Two subcommands:
// - live: crawl the real network through a local overlay bridge daemon
// - replay: crawl a topology file offline (for testing and demos)
//
// Both share the same output and retry options (see CrawlArgs).
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use ygg_crawler::crawl::{RetryPolicy, DEFAULT_ATTEMPTS};

#[derive(Parser, Debug)]
#[command(
    name = "ygg-crawler",
    version = "0.1.0",
    about = "Maps the reachable topology of a Yggdrasil-style overlay network",
    long_about = "ygg-crawler starts from the local node, DHT pings every node it hears about, \
                  asks each responding node for its nodeinfo, and writes everything it found \
                  to a single JSON results file."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl the live network through an overlay bridge daemon
    ///
    /// Example: ygg-crawler live http://127.0.0.1:9001 --file results.json
    Live {
        /// Base URL of the bridge daemon (e.g., http://127.0.0.1:9001)
        bridge_url: String,

        /// Start crawling once the local DHT table has this many entries
        #[arg(long, default_value_t = 4)]
        min_table_entries: usize,

        /// Seconds between DHT table checks while waiting for bootstrap
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        bootstrap_interval_secs: u64,

        /// Give up on a single bridge request after this many seconds
        ///
        /// Without this flag a request that never gets an answer can hold up
        /// the crawl forever.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        call_timeout_secs: Option<u64>,

        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Crawl a topology file instead of the live network
    ///
    /// Example: ygg-crawler replay topology.json --retry 1
    Replay {
        /// JSON file describing the network to crawl
        topology: PathBuf,

        #[command(flatten)]
        crawl: CrawlArgs,
    },
}

/// Options shared by every kind of crawl
#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// File to write the results to
    #[arg(long, default_value = "results.json")]
    pub file: PathBuf,

    /// Attempts per DHT ping or nodeinfo request
    #[arg(
        long,
        default_value_t = DEFAULT_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub retry: u32,

    /// Upper bound in milliseconds of the random delay before the first
    /// attempt (doubles on every further attempt)
    #[arg(long, default_value_t = 1000)]
    pub backoff_ms: u64,

    /// Also print the results as JSON to stdout
    #[arg(long)]
    pub json: bool,

    /// Log every failed attempt
    #[arg(short, long)]
    pub verbose: bool,
}

impl CrawlArgs {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry, Duration::from_millis(self.backoff_ms))
    }
}
