//! Process command line and rc file

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::ConfigError;
use crate::logging::LogLevel;
use crate::ports::{PortAllocator, PortRange, DEFAULT_MAX_PORT, DEFAULT_MIN_PORT};
use crate::registry::config::WORKER_SUBCOMMAND;
use crate::resolver::{Credentials, PluginOptions};
use crate::shell::ShellSettings;
use crate::worker::{DEFAULT_PLAYER, XSPLIT_PLAYER};

const EXAMPLE_USAGE: &str = "example usage:

$ lsmgr
lsmgr$ stream twitch.tv/onemoregametv
Found streams: 240p, 360p, 480p, 720p, best, iphonehigh, iphonelow, live
lsmgr$ stream twitch.tv/onemoregametv 720p

Stream now playbacks in player (default is VLC).";

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(
    name = "lsmgr",
    version,
    about = "Interactive shell that launches streams from various streaming services in a custom video player",
    after_help = EXAMPLE_USAGE
)]
pub struct Args {
    /// Set log level
    #[arg(short, long, value_enum, value_name = "level", default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Minimum port in the range to start streams, at least 50000
    #[arg(long, value_name = "port", default_value_t = DEFAULT_MIN_PORT)]
    pub min_port: u16,

    /// Maximum port in the range to start streams
    #[arg(long, value_name = "port", default_value_t = DEFAULT_MAX_PORT)]
    pub max_port: u16,

    /// Command-line for player, default is 'vlc'
    #[arg(short, long, value_name = "player")]
    pub player: Option<String>,

    /// Show XSplit URLs to open with the IP Camera plugin and re-stream from VLC over RTSP
    #[arg(short, long)]
    pub xsplit: bool,

    /// Log possible errors from internal command-lines to a temporary file
    #[arg(short, long)]
    pub errorlog: bool,

    /// Specify location of rtmpdump
    #[arg(short, long, value_name = "path")]
    pub rtmpdump: Option<String>,

    /// Specify JustinTV cookie to allow access to subscription channels
    #[arg(short, long, value_name = "cookie")]
    pub jtv_cookie: Option<String>,

    /// Specify GOMTV cookie to allow access to streams
    #[arg(long, value_name = "cookie")]
    pub gomtv_cookie: Option<String>,

    /// Specify GOMTV username to allow access to streams
    #[arg(long, value_name = "username")]
    pub gomtv_username: Option<String>,

    /// Specify GOMTV password (if left blank you will be prompted)
    #[arg(long, value_name = "password", num_args = 0..=1, default_missing_value = "")]
    pub gomtv_password: Option<String>,

    /// External resolver program for service URLs (e.g. livestreamer)
    #[arg(long, value_name = "program")]
    pub resolver: Option<String>,

    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Run a single stream job (started by the shell)
    #[command(name = WORKER_SUBCOMMAND, hide = true)]
    Worker {
        /// Worker identifier
        #[arg(long)]
        id: u32,

        /// Supervision channel address
        #[arg(long)]
        channel: SocketAddr,
    },
}

impl Args {
    /// Whether the GOMTV password has to be asked for
    pub fn wants_gomtv_password(&self) -> bool {
        self.gomtv_password.as_deref() == Some("")
    }

    /// Player template after applying the XSplit default
    pub fn effective_player(&self) -> String {
        match &self.player {
            Some(player) => player.clone(),
            None if self.xsplit => XSPLIT_PLAYER.to_string(),
            None => DEFAULT_PLAYER.to_string(),
        }
    }

    pub fn port_range(&self) -> Result<PortRange, ConfigError> {
        PortRange::new(self.min_port, self.max_port)
    }

    pub fn plugin_options(&self) -> PluginOptions {
        PluginOptions {
            credentials: Credentials {
                jtv_cookie: self.jtv_cookie.clone(),
                gomtv_cookie: self.gomtv_cookie.clone(),
                gomtv_username: self.gomtv_username.clone(),
                gomtv_password: self.gomtv_password.clone().filter(|p| !p.is_empty()),
            },
            rtmpdump: self.rtmpdump.clone(),
            errorlog: self.errorlog,
            external_resolver: self.resolver.clone(),
        }
    }

    /// Shell defaults derived from the arguments
    pub fn shell_settings(&self) -> Result<ShellSettings, ConfigError> {
        Ok(ShellSettings {
            player: self.effective_player(),
            xsplit: self.xsplit,
            loglevel: self.loglevel,
            options: self.plugin_options(),
            ports: PortAllocator::new(self.port_range()?),
        })
    }
}

/// Location of the rc file
pub fn rc_file() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::config_dir().map(|dir| dir.join("livestreamer-manager").join("lsm.conf"))
    } else {
        dirs::home_dir().map(|dir| dir.join(".lsm.conf"))
    }
}

/// Split rc file contents into arguments. Lines starting with `#` are
/// comments.
pub fn rc_args(contents: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    for (n, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let words = shlex::split(line).ok_or_else(|| format!("line {}: unbalanced quotes", n + 1))?;
        args.extend(words);
    }
    Ok(args)
}

/// Put rc arguments right after the program name so the command line wins.
///
/// Worker invocations are left alone: their arguments come from the shell.
pub fn with_rc_args(argv: Vec<OsString>, rc: Vec<String>) -> Vec<OsString> {
    if rc.is_empty() || argv.get(1).is_some_and(|arg| arg == WORKER_SUBCOMMAND) {
        return argv;
    }

    let mut argv = argv.into_iter();
    let mut merged: Vec<OsString> = argv.next().into_iter().collect();
    merged.extend(rc.into_iter().map(OsString::from));
    merged.extend(argv);
    merged
}

/// Parse the process arguments, honouring the rc file
pub fn parse() -> Args {
    let argv: Vec<OsString> = std::env::args_os().collect();
    let is_worker = argv.get(1).is_some_and(|arg| arg == WORKER_SUBCOMMAND);

    let rc = match rc_file().filter(|path| !is_worker && path.is_file()) {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(contents) => rc_args(&contents).unwrap_or_else(|e| {
                eprintln!("warning: ignoring {}: {}", path.display(), e);
                Vec::new()
            }),
            Err(e) => {
                eprintln!("warning: unable to read {}: {}", path.display(), e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    Args::parse_from(with_rc_args(argv, rc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(line: &str) -> Args {
        Args::try_parse_from(shlex::split(line).unwrap()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse_args("lsmgr");

        assert_eq!(args.loglevel, LogLevel::Info);
        assert_eq!(args.port_range().unwrap(), PortRange::default());
        assert_eq!(args.effective_player(), "vlc");
        assert!(args.mode.is_none());
        assert!(!args.wants_gomtv_password());
    }

    #[test]
    fn test_xsplit_player_template() {
        let args = parse_args("lsmgr -x");
        assert!(args.effective_player().contains("{PORT}"));

        let args = parse_args("lsmgr -x -p mpv");
        assert_eq!(args.effective_player(), "mpv");
    }

    #[test]
    fn test_password_prompt_flag() {
        assert!(parse_args("lsmgr --gomtv-password").wants_gomtv_password());

        let args = parse_args("lsmgr --gomtv-password secret --gomtv-username me");
        assert!(!args.wants_gomtv_password());
        let creds = args.plugin_options().credentials;
        assert_eq!(creds.gomtv_password.as_deref(), Some("secret"));
        assert_eq!(
            creds.as_args(),
            vec!["--gomtv-username", "me", "--gomtv-password", "secret"]
        );
    }

    #[test]
    fn test_invalid_port_range() {
        assert!(parse_args("lsmgr --min-port 1000").shell_settings().is_err());
        assert!(parse_args("lsmgr --min-port 60000 --max-port 55000").shell_settings().is_err());
    }

    #[test]
    fn test_worker_mode() {
        let args = parse_args("lsmgr worker --id 4 --channel 127.0.0.1:40000");
        assert_eq!(
            args.mode,
            Some(Mode::Worker {
                id: 4,
                channel: "127.0.0.1:40000".parse().unwrap()
            })
        );
    }

    #[test]
    fn test_rc_args_come_first() {
        let rc = rc_args("# defaults\n--player 'mpv --fs'\n\n-l debug\n").unwrap();
        assert_eq!(rc, vec!["--player", "mpv --fs", "-l", "debug"]);

        let argv = vec![OsString::from("lsmgr"), OsString::from("-l"), OsString::from("error")];
        let merged = with_rc_args(argv, rc);
        let args = Args::try_parse_from(merged).unwrap();

        assert_eq!(args.player.as_deref(), Some("mpv --fs"));
        assert_eq!(args.loglevel, LogLevel::Error);
    }

    #[test]
    fn test_rc_args_skip_worker() {
        let argv: Vec<OsString> = ["lsmgr", "worker", "--id", "1", "--channel", "127.0.0.1:1"]
            .into_iter()
            .map(OsString::from)
            .collect();
        let merged = with_rc_args(argv.clone(), vec!["-x".into()]);
        assert_eq!(merged, argv);
    }

    #[test]
    fn test_bad_rc_quotes() {
        assert!(rc_args("--player 'vlc").is_err());
    }
}
