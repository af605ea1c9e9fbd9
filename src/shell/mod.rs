//! Interactive command loop
//!
//! ```text
//!            ┌──────────── command done ◄─────────────┐
//!            ▼                                         │
//!   ──►   idle ── line ──► parse ──► list | stream | kill | player
//!            │                       ports | jtvauth | gomtvauth
//!            │                                         │
//!            ├── exit / end of input ──► confirm if streams are running
//!            │                              │ yes: kill all ──► terminated
//!            │                              │ no ──────────────► idle
//!            └── interrupt ──► kill all (no confirmation) ──► terminated
//! ```
//!
//! The shell owns the [`StreamRegistry`] and is the only task touching it.
//! Input is any `AsyncBufRead`, output any `AsyncWrite`, so the loop can be
//! driven by scripted IO in tests.

pub mod command;
pub mod settings;
pub mod table;

use std::future::Future;
use std::io;
use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::ports::PortRange;
use crate::registry::{Selection, StreamRegistry};
use crate::worker::WorkerStatus;

pub use command::{CommandLine, ShellCommand};
pub use settings::ShellSettings;
pub use table::Table;

use command::{GomtvAuthArgs, JtvAuthArgs, KillArgs, PortsArgs, StreamArgs};

/// Prompt shown while idle
pub const PROMPT: &str = "lsmgr$ ";

const STREAM_USAGE: &str = "example usage:

$ stream twitch.tv/onemoregametv
Found streams: 240p, 360p, 480p, 720p, best, iphonehigh, iphonelow, live
$ stream twitch.tv/onemoregametv 720p

Stream now playbacks in player (default is VLC).
";

/// Whether the loop keeps going after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Where secrets are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretInput {
    /// The shell's own input, echoed
    Inline,
    /// The controlling terminal, without echo
    Terminal,
}

enum Event {
    Line(String),
    EndOfInput,
    Interrupt,
}

/// Interactive shell over a worker registry
pub struct Shell<R, W> {
    input: R,
    output: W,
    registry: StreamRegistry,
    settings: ShellSettings,
    secrets: SecretInput,
}

impl<R, W> Shell<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W, registry: StreamRegistry, settings: ShellSettings) -> Self {
        Self {
            input,
            output,
            registry,
            settings,
            secrets: SecretInput::Inline,
        }
    }

    /// Read passwords from the terminal without echo
    pub fn terminal_secrets(mut self) -> Self {
        self.secrets = SecretInput::Terminal;
        self
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &ShellSettings {
        &self.settings
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// Run until exit, end of input or Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Unable to listen for interrupts");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until exit or end of input. When `shutdown` completes while the
    /// shell is idle, every stream is killed without confirmation.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            self.print(PROMPT).await?;

            let event = tokio::select! {
                biased;
                _ = &mut shutdown => Event::Interrupt,
                line = read_line(&mut self.input) => match line? {
                    Some(line) => Event::Line(line),
                    None => Event::EndOfInput,
                },
            };

            match event {
                Event::Interrupt => {
                    self.println("").await?;
                    self.println("Caught keyboard interrupt. Killing all streams.").await?;
                    tracing::info!("Interrupted, killing all streams");
                    self.registry.kill(&Selection::All).await;
                    return Ok(());
                }
                Event::EndOfInput => {
                    self.println("").await?;
                    if self.exit().await? == Flow::Exit {
                        return Ok(());
                    }
                }
                Event::Line(line) => {
                    if self.execute(&line).await? == Flow::Exit {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run one line of input
    pub async fn execute(&mut self, line: &str) -> Result<Flow> {
        let command = match CommandLine::parse_line(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Flow::Continue),
            Err(message) => {
                self.println(message.trim_end()).await?;
                return Ok(Flow::Continue);
            }
        };

        tracing::debug!(command = ?command, "Dispatching command");

        match command {
            ShellCommand::List => self.list().await?,
            ShellCommand::Stream(args) => self.stream(args).await?,
            ShellCommand::Kill(args) => self.kill(args).await?,
            ShellCommand::Player(args) => {
                self.settings.player = args.command_line();
            }
            ShellCommand::Ports(args) => self.ports(args).await?,
            ShellCommand::JtvAuth(args) => self.jtv_auth(args).await?,
            ShellCommand::GomtvAuth(args) => self.gomtv_auth(args).await?,
            ShellCommand::Exit => return self.exit().await,
        }

        Ok(Flow::Continue)
    }

    async fn list(&mut self) -> Result<()> {
        let workers = self.registry.list();
        if workers.is_empty() {
            self.println("There are no streams running").await?;
        } else {
            self.print(&Table::workers(&workers).to_string()).await?;
        }
        Ok(())
    }

    async fn stream(&mut self, mut args: StreamArgs) -> Result<()> {
        let Some(url) = args.url.clone() else {
            self.print(STREAM_USAGE).await?;
            return Ok(());
        };

        if let Some(path) = args.output.clone() {
            if !args.force && path != Path::new("-") && path.is_file() {
                let question = format!("File {} already exists! Overwrite it? [y/N] ", path.display());
                if !self.ask_overwrite(&question).await? {
                    return Ok(());
                }
                args.force = true;
            }
        }

        let request = self.settings.request(&url, &args);
        match self.registry.create(request).await {
            Ok(id) => {
                let Some(info) = self.registry.get(id) else {
                    return Ok(());
                };
                if let Some(cmdline) = &info.cmdline {
                    self.println(cmdline).await?;
                } else if info.status == WorkerStatus::Running {
                    self.println(&format!("Stream {} started", id)).await?;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Unable to start stream");
                self.println(&format!("Unable to start stream: {}", e)).await?;
            }
        }
        Ok(())
    }

    async fn kill(&mut self, args: KillArgs) -> Result<()> {
        self.registry.reap();

        let (selection, invalid) = args.selection();
        let (targets, unknown) = self.registry.select(&selection);

        for token in &invalid {
            self.println(&format!("{} is not a valid stream ID.", token)).await?;
        }
        for id in &unknown {
            self.println(&format!("{} is not a valid stream ID.", id)).await?;
        }
        if !invalid.is_empty() || !unknown.is_empty() {
            self.println("Use the list command to list all streams").await?;
        }

        if targets.is_empty() {
            if selection == Selection::All {
                self.println("There are no streams running").await?;
            }
            return Ok(());
        }

        self.print(&Table::workers(&targets).to_string()).await?;
        let which = if targets.len() == 1 {
            "this stream"
        } else {
            "these streams"
        };
        let question = format!("Are you sure you want to kill {}? (y/n) ", which);
        if !self.confirm(&question, false).await? {
            return Ok(());
        }

        let ids = targets.iter().map(|info| info.id).collect();
        let report = self.registry.kill(&Selection::Ids(ids)).await;
        for info in &report.killed {
            self.println(&format!("Stream {} stopped ({})", info.id, info.status))
                .await?;
        }
        Ok(())
    }

    async fn ports(&mut self, args: PortsArgs) -> Result<()> {
        if args.min.is_none() && args.max.is_none() {
            self.println("ports requires one argument: ports --min [port] --max [port]")
                .await?;
            return Ok(());
        }

        let current = self.settings.ports.range();
        let min = args.min.unwrap_or(current.min());
        let max = args.max.unwrap_or(current.max());
        match PortRange::new(min, max) {
            Ok(range) => {
                tracing::debug!(range = %range, "Port range changed");
                self.settings.ports.set_range(range);
            }
            Err(e) => self.println(&format!("Invalid port range: {}", e)).await?,
        }
        Ok(())
    }

    async fn jtv_auth(&mut self, args: JtvAuthArgs) -> Result<()> {
        match args.cookie {
            Some(cookie) => self.settings.options.credentials.jtv_cookie = Some(cookie),
            None => {
                self.println("jtvauth requires a cookie: jtvauth -c [cookie]")
                    .await?
            }
        }
        Ok(())
    }

    async fn gomtv_auth(&mut self, args: GomtvAuthArgs) -> Result<()> {
        if let Some(cookie) = args.cookie {
            self.settings.options.credentials.gomtv_cookie = Some(cookie);
        }
        if let Some(username) = args.username {
            self.settings.options.credentials.gomtv_username = Some(username);
        }
        if let Some(password) = args.password {
            let password = if password.is_empty() {
                self.read_secret("GOMTV Password: ").await?
            } else {
                Some(password)
            };
            if let Some(password) = password {
                self.settings.options.credentials.gomtv_password = Some(password);
            }
        }
        Ok(())
    }

    /// Leave the shell, confirming first if streams are still running.
    /// End of input while asking counts as yes.
    async fn exit(&mut self) -> Result<Flow> {
        if !self.registry.has_active() {
            return Ok(Flow::Exit);
        }

        self.println("There are streams still running!").await?;
        if !self.confirm("Are you sure you want to quit? (y/n) ", true).await? {
            return Ok(Flow::Continue);
        }

        let report = self.registry.kill(&Selection::All).await;
        tracing::info!(killed = report.killed.len(), "All streams killed");
        Ok(Flow::Exit)
    }

    /// Ask until the answer contains `y` or `n`
    async fn confirm(&mut self, question: &str, on_end_of_input: bool) -> Result<bool> {
        loop {
            self.print(question).await?;
            let Some(answer) = read_line(&mut self.input).await? else {
                self.println("").await?;
                return Ok(on_end_of_input);
            };

            let answer = answer.to_lowercase();
            if answer.contains('y') {
                return Ok(true);
            }
            if answer.contains('n') {
                return Ok(false);
            }
        }
    }

    /// Single-shot question where only `y` means yes
    async fn ask_overwrite(&mut self, question: &str) -> Result<bool> {
        self.print(question).await?;
        let answer = read_line(&mut self.input).await?;
        Ok(answer.is_some_and(|a| a.trim().eq_ignore_ascii_case("y")))
    }

    async fn read_secret(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.secrets {
            SecretInput::Inline => {
                self.print(prompt).await?;
                Ok(read_line(&mut self.input).await?)
            }
            SecretInput::Terminal => {
                let prompt = prompt.to_string();
                let password = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
                    .await
                    .map_err(io::Error::other)??;
                Ok(Some(password))
            }
        }
    }

    async fn print(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await
    }

    async fn println(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await
    }
}

/// Read one line without its terminator; `None` at end of input
async fn read_line<R: AsyncBufRead + Unpin>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(|c| c == '\n' || c == '\r').len();
    line.truncate(trimmed);
    Ok(Some(line))
}
