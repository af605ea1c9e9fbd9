//! Worker registry
//!
//! The registry starts worker processes, tracks them by identifier and
//! stops them. It is owned by the shell and driven from a single task.
//!
//! # Lifecycle
//!
//! ```text
//!   create(request)
//!     │  bind loopback listener, spawn `<exe> worker --id N --channel ADDR`
//!     ▼
//!   rendezvous ──── Started ──► Running ─┐
//!     │  │                                │ kill: send Kill to all,
//!     │  └───────── Failed ───► Failed    │ then join all (force-kill
//!     └── exit without report ► Failed    │ after kill_timeout)
//!                                         ▼
//!   reap(): try_wait every entry, exited ones leave with their final
//!           status (exit code 0 finished, 3 or signal killed, else failed)
//! ```
//!
//! Creation is serialised: one rendezvous completes before the next worker
//! is spawned, so start-up log lines of different workers never interleave.

pub mod config;
pub mod entry;
pub mod error;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{KillReport, Selection, WorkerEntry, WorkerId, WorkerInfo};
pub use error::RegistryError;
pub use store::StreamRegistry;
