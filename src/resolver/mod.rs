//! URL resolution into openable streams
//!
//! A [`Resolver`] turns a URL into a [`PluginHandle`], which lists the
//! qualities available for it. Each quality maps to a [`Stream`], a closed
//! set of variants sharing one capability: `open()` yields a [`ByteSource`].
//!
//! ```text
//!   resolve(url) ──► PluginHandle ──► streams() ──► { "720p": Stream, ... }
//!        │                                                  │
//!   NoPluginFound                                     open() ──► ByteSource
//!                                                           │
//!                                                      StreamError
//! ```
//!
//! [`Session`] is the built-in resolver used by worker processes.

pub mod error;
pub mod options;
pub mod plugin;
pub mod stream;

use std::collections::BTreeMap;
use std::future::Future;

pub use error::{ResolveError, StreamError};
pub use options::{Credentials, PluginOptions};
pub use plugin::{Plugin, ResolvedUrl, Session};
pub use stream::{ByteSource, ProcessStream, Stream};

/// Qualities keyed by name, iterated in sorted order
pub type Streams = BTreeMap<String, Stream>;

/// Maps a URL to the plugin that can handle it
pub trait Resolver {
    /// Handle returned for a matching URL
    type Handle: PluginHandle;

    /// Find a plugin for `url`, or fail with [`ResolveError::NoPluginFound`]
    fn resolve(&self, url: &str) -> Result<Self::Handle, ResolveError>;
}

/// A URL matched by a plugin
pub trait PluginHandle {
    /// Name of the matching plugin
    fn plugin_name(&self) -> &str;

    /// Fetch the available qualities
    fn streams(&self) -> impl Future<Output = Result<Streams, ResolveError>> + Send;
}
