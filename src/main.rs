//! Command line entry point for the overlay engine.
//!
//! Opens an engine over a workspace, runs one triple pattern query, and
//! optionally keeps polling the changelog feed until interrupted.
//!
//! Usage:
//!   cargo run -- --base-file data/base.nt --workspace workspace --limit 10
//!   cargo run -- --subject http://example.org/s1 --watch

use clap::Parser;
use palimpsest::changesets::PollingAgent;
use palimpsest::{EngineConfig, LiveOverlayEngine, Query, QueryEvent, TriplePattern};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "palimpsest")]
#[command(about = "Live overlay engine for paginated triple pattern queries", long_about = None)]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Base dataset file (newline-delimited triples)
    #[arg(short, long)]
    base_file: Option<PathBuf>,

    #[arg(long)]
    subject: Option<String>,

    #[arg(long)]
    predicate: Option<String>,

    #[arg(long)]
    object: Option<String>,

    /// Page size; zero means unbounded
    #[arg(short, long, default_value = "10")]
    limit: usize,

    #[arg(short, long, default_value = "0")]
    offset: usize,

    /// Keep polling the changelog feed until CTRL+C
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(workspace) = args.workspace {
        config.workspace = workspace;
    }
    if let Some(base_file) = args.base_file {
        config.base_file = base_file;
    }

    let engine = Arc::new(LiveOverlayEngine::open(config.clone()).await?);

    let pattern = TriplePattern::new(
        args.subject.as_deref(),
        args.predicate.as_deref(),
        args.object.as_deref(),
    );
    let query = Query::new(pattern).with_limit(args.limit).with_offset(args.offset);

    let mut stream = engine.select(query);
    let mut rows = 0usize;
    while let Some(event) = stream.next_event().await {
        match event {
            QueryEvent::Metadata { total_count } => {
                println!("# estimated total count: {}", total_count);
            }
            QueryEvent::Triple(triple) => {
                rows += 1;
                println!("{}", triple.to_line());
            }
            QueryEvent::End => break,
            QueryEvent::Error(message) => {
                eprintln!("query failed: {}", message);
                break;
            }
        }
    }
    println!("# {} rows", rows);

    if args.watch {
        let agent = PollingAgent::new(&config);
        agent.start(Arc::clone(&engine));
        println!(
            "Polling {} every {} minutes, press CTRL+C to stop",
            config.changeset_base_url, config.polling_interval_mins
        );
        tokio::signal::ctrl_c().await?;
        agent.shutdown().await;
    }

    engine.close().await?;
    Ok(())
}
