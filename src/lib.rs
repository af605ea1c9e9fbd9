//! Interactive manager for concurrent live stream playback and recording
//!
//! A shell reads commands from the user and starts one worker process per
//! stream. Each worker resolves a service URL to a byte stream, checks that
//! data flows, then relays it to a player or a file until the stream ends or
//! the shell asks it to stop.
//!
//! ```text
//!   user ──► Shell ──► StreamRegistry ──spawn──► worker process
//!                          ▲                        │
//!                          │   SupervisionChannel   │ Resolver ──► Stream
//!                          └── Started / Failed ◄───┤
//!                              Kill ───────────────►│ relay ──► Sink
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lsmgr::registry::StreamRegistry;
//! use lsmgr::worker::StreamRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = StreamRegistry::new();
//! let id = registry.create(StreamRequest::new("twitch.tv/chan").quality("best")).await?;
//! println!("Stream {} started", id);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod cli;
pub mod error;
pub mod logging;
pub mod ports;
pub mod registry;
pub mod resolver;
pub mod shell;
pub mod worker;

pub use error::{Error, Result};
pub use registry::{RegistryConfig, StreamRegistry};
pub use shell::{Shell, ShellSettings};
pub use worker::StreamRequest;
