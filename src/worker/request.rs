//! Stream request handed to a worker at spawn time

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::resolver::PluginOptions;

/// Placeholder replaced by the assigned port in player commands
pub const PORT_PLACEHOLDER: &str = "{PORT}";

/// Output path that means "write to standard output"
pub const STDOUT_MARKER: &str = "-";

/// Default player command
pub const DEFAULT_PLAYER: &str = "vlc";

/// Player template used with `--xsplit`: VLC re-streams over RTSP
pub const XSPLIT_PLAYER: &str = "vlc --sout=#rtp{sdp=rtsp://:{PORT}/} --no-sout-rtp-sap --no-sout-standard-sap --ttl=1 --sout-keep";

/// Everything a worker needs to run one stream job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Stream URL
    pub url: String,

    /// Requested quality; `None` lists the available ones
    pub quality: Option<String>,

    /// Player command template
    pub player: String,

    /// Port substituted for `{PORT}` in the player template
    pub port: Option<u16>,

    /// Write to this file (or `-` for stdout) instead of a player
    pub output: Option<PathBuf>,

    /// Overwrite an existing output file
    pub force: bool,

    /// Report the stream's command line instead of relaying it
    #[serde(default)]
    pub cmdline: bool,

    /// Log the XSplit RTSP URL when a port is used
    pub xsplit: bool,

    /// Log level inside the worker
    pub loglevel: LogLevel,

    /// Plugin settings and credentials
    pub options: PluginOptions,
}

/// Where the relayed bytes go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkTarget<'a> {
    Player,
    Stdout,
    File(&'a Path),
}

impl StreamRequest {
    /// Request for `url` with default settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            quality: None,
            player: DEFAULT_PLAYER.to_string(),
            port: None,
            output: None,
            force: false,
            cmdline: false,
            xsplit: false,
            loglevel: LogLevel::default(),
            options: PluginOptions::default(),
        }
    }

    /// Set the quality
    pub fn quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Write to `path` instead of a player
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Set the player template
    pub fn player(mut self, player: impl Into<String>) -> Self {
        self.player = player.into();
        self
    }

    /// Whether the player template asks for a port
    pub fn needs_port(&self) -> bool {
        self.player.contains(PORT_PLACEHOLDER)
    }

    /// Port shown in listings, only when the template uses one
    pub fn display_port(&self) -> Option<u16> {
        if self.needs_port() {
            self.port
        } else {
            None
        }
    }

    pub fn sink_target(&self) -> SinkTarget<'_> {
        match self.output.as_deref() {
            None => SinkTarget::Player,
            Some(path) if path == Path::new(STDOUT_MARKER) => SinkTarget::Stdout,
            Some(path) => SinkTarget::File(path),
        }
    }

    /// Final player command line with the port filled in.
    ///
    /// VLC is told to quit when its input ends.
    pub fn player_command(&self) -> String {
        let mut cmd = match self.port {
            Some(port) => self.player.replace(PORT_PLACEHOLDER, &port.to_string()),
            None => self.player.clone(),
        };
        if cmd.contains("vlc") {
            cmd.push_str(" - vlc://quit");
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_substitution() {
        let mut request = StreamRequest::new("twitch.tv/chan").player("mplayer -port {PORT}");
        request.port = Some(50123);

        assert!(request.needs_port());
        assert_eq!(request.display_port(), Some(50123));
        assert_eq!(request.player_command(), "mplayer -port 50123");
    }

    #[test]
    fn test_vlc_quits_at_end() {
        let request = StreamRequest::new("twitch.tv/chan");
        assert_eq!(request.player_command(), "vlc - vlc://quit");
        assert_eq!(request.display_port(), None);
    }

    #[test]
    fn test_sink_target() {
        let request = StreamRequest::new("u");
        assert_eq!(request.sink_target(), SinkTarget::Player);

        let request = StreamRequest::new("u").output("-");
        assert_eq!(request.sink_target(), SinkTarget::Stdout);

        let request = StreamRequest::new("u").output("/tmp/out.flv");
        assert_eq!(
            request.sink_target(),
            SinkTarget::File(Path::new("/tmp/out.flv"))
        );
    }

    #[test]
    fn test_json_transport() {
        let mut request = StreamRequest::new("rtmp://host/app").quality("live");
        request.options.credentials.gomtv_password = Some("secret".into());

        let json = serde_json::to_string(&request).unwrap();
        let decoded: StreamRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, request);
    }
}
