//! Stream workers
//!
//! A worker runs one [`StreamRequest`] in its own OS process so that the
//! stream program and the player it feeds can be torn down as a unit.
//!
//! ```text
//!  resolve ─► check port ─► list qualities ─► open ─► pre-buffer ─► sink
//!     │           │              │              │          │          │
//!     └───────────┴──── Failed ──┴──────────────┴──────────┴──────────┘
//!                                                                      │
//!                                                                  Started
//!                                                                      │
//!                                     relay ◄──── try_recv / kill ─────┘
//!                                       │
//!                           end of stream │ I/O error │ kill
//!                                       ▼
//!                          close source, close sink, exit code
//! ```
//!
//! Exit codes tell the registry how the job ended: [`EXIT_FINISHED`],
//! [`EXIT_FAILED`] or [`EXIT_KILLED`].

pub mod process;
pub mod progress;
pub mod request;
pub mod runner;
pub mod sink;
pub mod state;

pub use process::{run_process, REQUEST_ENV};
pub use progress::ProgressMeter;
pub use request::{SinkTarget, StreamRequest, DEFAULT_PLAYER, PORT_PLACEHOLDER, XSPLIT_PLAYER};
pub use runner::{StreamWorker, CHUNK_SIZE};
pub use sink::{Sink, SinkError};
pub use state::{WorkerOutcome, WorkerStatus, EXIT_FAILED, EXIT_FINISHED, EXIT_KILLED};
