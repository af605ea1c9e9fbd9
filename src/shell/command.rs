//! Shell command grammar

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::registry::{Selection, WorkerId};

/// Keyword selecting every tracked stream in `kill`
pub const ALL_STREAMS: &str = "all";

/// One line of shell input
#[derive(Parser, Debug)]
#[command(
    name = "lsmgr",
    no_binary_name = true,
    disable_version_flag = true,
    subcommand_required = true
)]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

impl CommandLine {
    /// Split `line` like a POSIX shell and parse it.
    ///
    /// Returns `Ok(None)` for a blank line.
    pub fn parse_line(line: &str) -> Result<Option<ShellCommand>, String> {
        let words = shlex::split(line).ok_or_else(|| "Invalid input: unbalanced quotes".to_string())?;
        if words.is_empty() {
            return Ok(None);
        }

        CommandLine::try_parse_from(words)
            .map(|parsed| Some(parsed.command))
            .map_err(|e| e.to_string())
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// List streams currently running
    #[command(visible_alias = "l")]
    List,

    /// Start a new stream
    #[command(visible_alias = "s")]
    Stream(StreamArgs),

    /// Kill running streams
    #[command(visible_alias = "k")]
    Kill(KillArgs),

    /// Command-line for player
    Player(PlayerArgs),

    /// Specify ports to start streams on if streaming
    Ports(PortsArgs),

    /// Specify JustinTV authentication with cookie to allow access to subscription channels
    #[command(name = "jtvauth")]
    JtvAuth(JtvAuthArgs),

    /// Specify GOMTV authentication with the cookie or username and password
    #[command(name = "gomtvauth")]
    GomtvAuth(GomtvAuthArgs),

    /// Exit the command line
    #[command(visible_alias = "e")]
    Exit,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamArgs {
    /// URL to stream
    pub url: Option<String>,

    /// Stream quality to play, use 'best' for highest quality available
    pub quality: Option<String>,

    /// Command-line for player, default is the shell's player
    #[arg(short, long, value_name = "player")]
    pub player: Option<String>,

    /// The port to use if the player command contains '{PORT}'
    #[arg(short = 'Q', long, value_name = "port", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Write stream to file instead of playing it ('-' for standard output)
    #[arg(short, long, value_name = "filename")]
    pub output: Option<PathBuf>,

    /// Always write to file even if it already exists
    #[arg(short, long)]
    pub force: bool,

    /// Print command-line used internally to play stream
    #[arg(short, long)]
    pub cmdline: bool,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct KillArgs {
    /// The stream ids, or "all" to kill all streams
    #[arg(value_name = "id", required = true)]
    pub ids: Vec<String>,
}

impl KillArgs {
    /// Turn the arguments into a selection plus the tokens that are not ids
    pub fn selection(&self) -> (Selection, Vec<String>) {
        if self.ids.iter().any(|id| id.eq_ignore_ascii_case(ALL_STREAMS)) {
            return (Selection::All, Vec::new());
        }

        let mut ids = Vec::new();
        let mut invalid = Vec::new();
        for token in &self.ids {
            match token.parse::<WorkerId>() {
                Ok(id) => ids.push(id),
                Err(_) => invalid.push(token.clone()),
            }
        }
        (Selection::Ids(ids), invalid)
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PlayerArgs {
    /// Command-line for player
    #[arg(
        value_name = "command",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl PlayerArgs {
    /// The command words joined back into one command line
    pub fn command_line(&self) -> String {
        shlex::try_join(self.command.iter().map(String::as_str))
            .unwrap_or_else(|_| self.command.join(" "))
    }
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct PortsArgs {
    /// Minimum port in the range to start streams (at least 50000)
    #[arg(long, value_name = "port")]
    pub min: Option<u16>,

    /// Maximum port in the range to start streams
    #[arg(long, value_name = "port")]
    pub max: Option<u16>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct JtvAuthArgs {
    /// JustinTV cookie
    #[arg(short, long, value_name = "cookie")]
    pub cookie: Option<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GomtvAuthArgs {
    /// GOMTV cookie
    #[arg(short, long, value_name = "cookie")]
    pub cookie: Option<String>,

    /// GOMTV username
    #[arg(short, long, value_name = "username")]
    pub username: Option<String>,

    /// GOMTV password (if left blank you will be prompted)
    #[arg(short, long, value_name = "password", num_args = 0..=1, default_missing_value = "")]
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ShellCommand {
        CommandLine::parse_line(line).unwrap().unwrap()
    }

    #[test]
    fn test_aliases() {
        assert_eq!(parse("l"), ShellCommand::List);
        assert_eq!(parse("e"), ShellCommand::Exit);
        assert!(matches!(parse("s twitch.tv/chan"), ShellCommand::Stream(_)));
        assert!(matches!(parse("k 1"), ShellCommand::Kill(_)));
    }

    #[test]
    fn test_stream_args() {
        let cmd = parse("stream twitch.tv/chan 720p -o '/tmp/my stream.flv' -f -Q 50010");
        let ShellCommand::Stream(args) = cmd else {
            panic!("not a stream command");
        };

        assert_eq!(args.url.as_deref(), Some("twitch.tv/chan"));
        assert_eq!(args.quality.as_deref(), Some("720p"));
        assert_eq!(args.output, Some(PathBuf::from("/tmp/my stream.flv")));
        assert!(args.force);
        assert_eq!(args.port, Some(50010));
        assert!(!args.cmdline);

        let ShellCommand::Stream(args) = parse("s rtmp://host/app live --cmdline") else {
            panic!("not a stream command");
        };
        assert!(args.cmdline);
    }

    #[test]
    fn test_kill_selection() {
        let ShellCommand::Kill(args) = parse("kill 3 x 1") else {
            panic!("not a kill command");
        };
        assert_eq!(
            args.selection(),
            (Selection::Ids(vec![3, 1]), vec!["x".to_string()])
        );

        let ShellCommand::Kill(args) = parse("kill 2 all") else {
            panic!("not a kill command");
        };
        assert_eq!(args.selection(), (Selection::All, Vec::new()));
    }

    #[test]
    fn test_kill_needs_an_id() {
        assert!(CommandLine::parse_line("kill").is_err());
    }

    #[test]
    fn test_player_keeps_flags() {
        let ShellCommand::Player(args) = parse("player mpv --fs --cache=yes") else {
            panic!("not a player command");
        };
        assert_eq!(args.command_line(), "mpv --fs --cache=yes");
    }

    #[test]
    fn test_gomtv_password_prompt_marker() {
        let ShellCommand::GomtvAuth(args) = parse("gomtvauth -u me -p") else {
            panic!("not a gomtvauth command");
        };
        assert_eq!(args.username.as_deref(), Some("me"));
        assert_eq!(args.password.as_deref(), Some(""));
    }

    #[test]
    fn test_blank_and_bad_lines() {
        assert_eq!(CommandLine::parse_line("   ").unwrap(), None);
        assert!(CommandLine::parse_line("stream 'unterminated").is_err());
        assert!(CommandLine::parse_line("frobnicate").is_err());
    }
}
