//! Contract Lens
//!
//! Finds crypto contract addresses in a streaming feed's content tree, turns
//! them into interactive markers in place, and annotates them with market and
//! security data aggregated from several upstream sources.
//!
//! # Pipeline
//!
//! - **Detection**: per-network patterns with length bounds and a denylist
//!   ([`detect`]), run over the logical text of a content container even when
//!   the host page split an address across several text leaves ([`tree`]).
//! - **Analysis**: five upstream sources queried concurrently and merged
//!   into one partially-populated record; any subset may fail ([`analysis`]).
//! - **Presentation**: a single popover per page, driven by one event loop
//!   ([`popover`], [`overlay`]), with completions broadcast to every
//!   listening surface ([`bus`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analysis;
pub mod bus;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod overlay;
pub mod popover;
pub mod store;
pub mod tree;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging. Logs go to stderr so command output stays clean.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| Error::Internal(format!("tracing already initialised: {e}")))?;
        }
        Some("text") | None => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| Error::Internal(format!("tracing already initialised: {e}")))?;
        }
        Some(other) => {
            return Err(Error::Config(format!("unknown log format '{other}'")));
        }
    }

    Ok(())
}
