//! Shell-level defaults merged into every stream request

use crate::logging::LogLevel;
use crate::ports::PortAllocator;
use crate::resolver::PluginOptions;
use crate::worker::{StreamRequest, DEFAULT_PLAYER};

use super::command::StreamArgs;

/// Defaults the shell applies to `stream` commands
#[derive(Debug, Clone)]
pub struct ShellSettings {
    /// Player command template
    pub player: String,

    /// Log XSplit URLs
    pub xsplit: bool,

    /// Log level forwarded to workers
    pub loglevel: LogLevel,

    /// Plugin options and credentials
    pub options: PluginOptions,

    /// Ports for players that need one
    pub ports: PortAllocator,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            player: DEFAULT_PLAYER.to_string(),
            xsplit: false,
            loglevel: LogLevel::default(),
            options: PluginOptions::default(),
            ports: PortAllocator::default(),
        }
    }
}

impl ShellSettings {
    /// Build the request for `stream <url> ...`.
    ///
    /// Options given on the command win over shell defaults. A port is
    /// allocated only when the player template asks for one and none was
    /// given.
    pub fn request(&mut self, url: &str, args: &StreamArgs) -> StreamRequest {
        let mut request = StreamRequest::new(url);
        request.quality = args.quality.clone();
        request.player = args.player.clone().unwrap_or_else(|| self.player.clone());
        request.output = args.output.clone();
        request.force = args.force;
        request.cmdline = args.cmdline;
        request.xsplit = self.xsplit;
        request.loglevel = self.loglevel;
        request.options = self.options.clone();

        if request.needs_port() {
            request.port = Some(args.port.unwrap_or_else(|| self.ports.next()));
        }

        request
    }
}
