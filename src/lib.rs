//! # Palimpsest
//!
//! Palimpsest is a live-updatable overlay engine for paginated triple
//! pattern queries over large RDF datasets.
//!
//! A palimpsest is a manuscript page that was scraped clean and written
//! over, with the older text still visible underneath. This engine works
//! the same way: a large, rarely rewritten base dataset stays untouched
//! on disk while two small mutable overlays (added and removed triples)
//! are layered on top of it. Queries are answered against the logical
//! union `base - removed + added`, with stable pagination offsets even
//! while the overlays change underneath concurrent readers.
//!
//! The overlays are kept up to date by polling an upstream changelog
//! feed of hourly changeset files, folding the downloaded changesets
//! into a minimal net operation list, and applying that list to freshly
//! built overlay stores which are then swapped in atomically.
//! Periodically the overlays are compacted back into a new base dataset
//! file by an external consolidation step.
//!
//! ## Features
//!
//! - Triple pattern queries with limit/offset pagination and an
//!   estimated total count
//! - Changelog polling with net add/remove reconciliation
//! - Zero-downtime overlay and base dataset swaps
//! - Probabilistic over-fetching to absorb deletion gaps in one round
//!   trip to the base reader
//!
//! ## Example
//!
//! ```no_run
//! use palimpsest::{EngineConfig, LiveOverlayEngine, Query};
//!
//! # async fn example() -> palimpsest::Result<()> {
//! let engine = LiveOverlayEngine::open(EngineConfig::default()).await?;
//! let mut stream = engine.select(Query::default());
//! while let Some(event) = stream.next_event().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod changesets;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod filters;
pub mod parsing;
pub mod store;

pub use crate::config::EngineConfig;
pub use crate::core::{Query, Triple, TriplePattern};
pub use crate::engine::{LiveOverlayEngine, QueryEvent, QueryStream};
pub use crate::error::{Error, Result};
