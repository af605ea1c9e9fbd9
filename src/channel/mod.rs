//! Supervision channel between the shell and its workers
//!
//! Every worker process gets one loopback TCP connection back to the shell.
//! The same connection carries status upstream and control downstream:
//!
//! ```text
//!          shell (StreamRegistry)                  worker process
//!     ┌──────────────────────────┐         ┌──────────────────────────┐
//!     │ SupervisionListener      │◄────────│ SupervisionChannel       │
//!     │   accept() ──► channel   │ connect │   ::connect(addr)        │
//!     │                          │         │                          │
//!     │ recv() ◄─────────────────┼─────────┼── Started | Failed       │
//!     │ send(Kill) ──────────────┼────────►│── try_recv() / recv()    │
//!     └──────────────────────────┘         └──────────────────────────┘
//! ```
//!
//! Messages are framed as a 4-byte big-endian length followed by the payload
//! described in [`message`]. Delivery is FIFO and at most once; a `Kill` sent
//! to a worker that already exited is simply never read.

pub mod error;
pub mod message;
pub mod transport;

pub use error::ChannelError;
pub use message::{ControlMessage, Failure};
pub use transport::{SupervisionChannel, SupervisionListener};
