//! The stream job: resolve, select, open, relay

use std::io;

use crate::channel::{ControlMessage, Failure, SupervisionChannel};
use crate::ports::is_port_free;
use crate::resolver::{ByteSource, PluginHandle, Resolver};

use super::progress::ProgressMeter;
use super::request::StreamRequest;
use super::sink::Sink;
use super::state::WorkerOutcome;

/// Bytes read per relay cycle, and the size of the pre-buffer
pub const CHUNK_SIZE: usize = 8192;

/// Runs one [`StreamRequest`] and reports its first status over the
/// supervision channel.
///
/// Exactly one of `Started`, `Failed` or `CommandLine` is sent. After
/// `Started` the worker relays until end of stream, an I/O error or a kill
/// request.
pub struct StreamWorker {
    request: StreamRequest,
    channel: SupervisionChannel,
}

/// What the job does once a stream is selected
enum Prepared {
    /// Pre-buffer written, ready to relay
    Relay(ByteSource, Sink),
    /// Only the stream program's command line was asked for
    CommandLine(String),
}

/// Why the relay loop stopped
#[derive(Debug)]
enum RelayEnd {
    EndOfStream,
    Killed,
    ReadError(io::Error),
    WriteError(io::Error),
}

impl StreamWorker {
    pub fn new(request: StreamRequest, channel: SupervisionChannel) -> Self {
        Self { request, channel }
    }

    pub fn request(&self) -> &StreamRequest {
        &self.request
    }

    /// Run the job to completion
    pub async fn run<R: Resolver>(mut self, resolver: &R) -> WorkerOutcome {
        let (mut source, mut sink) = match self.prepare(resolver).await {
            Ok(Prepared::Relay(source, sink)) => (source, sink),
            Ok(Prepared::CommandLine(cmdline)) => {
                tracing::debug!(%cmdline, "Reporting command line");
                self.report(ControlMessage::CommandLine(cmdline)).await;
                return WorkerOutcome::Finished;
            }
            Err(failure) => {
                tracing::error!("{}", failure.reason);
                if self.request.quality.is_some() && !failure.qualities.is_empty() {
                    tracing::error!("Valid streams: {}", failure.qualities.join(", "));
                }
                self.report(ControlMessage::Failed(failure.clone())).await;
                return WorkerOutcome::Failed(failure);
            }
        };

        self.report(ControlMessage::Started).await;

        let (end, written) = relay(&mut source, &mut sink, &mut self.channel).await;
        let outcome = match end {
            RelayEnd::EndOfStream => {
                tracing::info!("Stream ended");
                WorkerOutcome::Finished
            }
            RelayEnd::Killed => {
                tracing::info!("Closing stream");
                WorkerOutcome::Killed
            }
            RelayEnd::ReadError(e) => {
                tracing::error!(error = %e, "Error when reading from stream");
                WorkerOutcome::Finished
            }
            RelayEnd::WriteError(e) => {
                tracing::error!(error = %e, "Error when writing to output");
                WorkerOutcome::Finished
            }
        };
        tracing::debug!(bytes = written, "Relay stopped");

        source.close().await;
        sink.close().await;
        outcome
    }

    /// Everything up to the `Started` report. On success the pre-buffer has
    /// already been written to the sink.
    async fn prepare<R: Resolver>(&self, resolver: &R) -> Result<Prepared, Failure> {
        let request = &self.request;

        if request.needs_port() && !request.cmdline {
            let port = request
                .port
                .ok_or_else(|| Failure::new("The player needs a port but none was assigned"))?;
            if !is_port_free(port) {
                return Err(Failure::new(format!("The port ({}) is already in use.", port)));
            }
        }

        let handle = resolver
            .resolve(&request.url)
            .map_err(|e| Failure::new(e.to_string()))?;
        tracing::info!(
            "Found matching plugin {} for URL {}",
            handle.plugin_name(),
            request.url
        );

        let mut streams = handle
            .streams()
            .await
            .map_err(|e| Failure::new(e.to_string()))?;
        if streams.is_empty() {
            return Err(Failure::new(format!(
                "No streams found on this URL: {}",
                request.url
            )));
        }

        // BTreeMap keys are already sorted
        let valid: Vec<String> = streams.keys().cloned().collect();

        let quality = match &request.quality {
            Some(quality) => quality,
            None => {
                return Err(Failure::new(format!("Found streams: {}", valid.join(", ")))
                    .with_qualities(valid));
            }
        };

        let stream = match streams.remove(quality) {
            Some(stream) => stream,
            None => {
                return Err(
                    Failure::new(format!("Invalid stream quality: {}", quality))
                        .with_qualities(valid),
                );
            }
        };

        if request.cmdline {
            return match stream.cmdline() {
                Some(cmdline) => Ok(Prepared::CommandLine(cmdline)),
                None => Err(Failure::new("Stream does not use a command-line")),
            };
        }

        tracing::info!(kind = stream.kind(), "Opening stream {}", quality);
        let mut source = stream
            .open()
            .await
            .map_err(|e| Failure::new(format!("Could not open stream - {}", e)))?;

        tracing::debug!("Pre-buffering {} bytes", CHUNK_SIZE);
        let mut prebuffer = vec![0u8; CHUNK_SIZE];
        let n = match source.read(&mut prebuffer).await {
            Ok(0) => {
                source.close().await;
                return Err(Failure::new("Failed to read data from stream"));
            }
            Ok(n) => n,
            Err(e) => {
                source.close().await;
                return Err(Failure::new(format!("Failed to read data from stream - {}", e)));
            }
        };

        let player_cmd = request.player_command();
        if request.output.is_none() {
            tracing::info!("Starting player: {}", request.player);
            if let Some(port) = request.port.filter(|_| request.needs_port()) {
                tracing::info!("Stream port is: {}", port);
                if request.xsplit {
                    tracing::info!("XSplit URL: rtsp://localhost:{}/\\\\rtsp_transport:udp", port);
                }
            }
        }

        let mut sink = match Sink::open(request.sink_target(), request.force, &player_cmd).await {
            Ok(sink) => sink,
            Err(e) => {
                source.close().await;
                return Err(Failure::new(e.to_string()));
            }
        };

        tracing::debug!(sink = sink.kind(), "Writing stream to output");
        if let Err(e) = sink.write_all(&prebuffer[..n]).await {
            source.close().await;
            sink.close().await;
            return Err(Failure::new(format!("Failed to write to output - {}", e)));
        }

        Ok(Prepared::Relay(source, sink))
    }

    async fn report(&mut self, msg: ControlMessage) {
        if let Err(e) = self.channel.send(&msg).await {
            tracing::warn!(error = %e, "Failed to report status");
        }
    }
}

/// Copy `source` into `sink` until it ends, fails, or a kill arrives.
///
/// The channel is polled before every read, and watched while a read or
/// write is pending so a stalled source cannot delay a kill. File sinks get
/// a byte counter on stderr.
async fn relay(
    source: &mut ByteSource,
    sink: &mut Sink,
    channel: &mut SupervisionChannel,
) -> (RelayEnd, u64) {
    let mut progress = sink
        .shows_progress()
        .then(|| ProgressMeter::new(tokio::io::stderr()));
    let (end, written) = copy_until_end(source, sink, channel, progress.as_mut()).await;

    if let Some(progress) = progress {
        if let Err(e) = progress.finish().await {
            tracing::debug!(error = %e, "Unable to end progress line");
        }
    }
    (end, written)
}

async fn copy_until_end(
    source: &mut ByteSource,
    sink: &mut Sink,
    channel: &mut SupervisionChannel,
    mut progress: Option<&mut ProgressMeter<tokio::io::Stderr>>,
) -> (RelayEnd, u64) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        match channel.try_recv() {
            Ok(Some(ControlMessage::Kill)) => return (RelayEnd::Killed, written),
            Ok(Some(other)) => tracing::debug!(msg = ?other, "Ignoring control message"),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Supervision channel lost");
                return (RelayEnd::Killed, written);
            }
        }

        let cycle = async {
            let n = source.read(&mut buf).await.map_err(RelayEnd::ReadError)?;
            if n == 0 {
                return Err(RelayEnd::EndOfStream);
            }
            sink.write_all(&buf[..n]).await.map_err(RelayEnd::WriteError)?;
            Ok::<usize, RelayEnd>(n)
        };

        let n = tokio::select! {
            biased;
            _ = kill_requested(channel) => return (RelayEnd::Killed, written),
            result = cycle => match result {
                Ok(n) => n,
                Err(end) => return (end, written),
            },
        };
        written += n as u64;

        if let Some(progress) = progress.as_deref_mut() {
            if let Err(e) = progress.update(n).await {
                tracing::debug!(error = %e, "Unable to show progress");
            }
        }
    }
}

/// Resolves once a kill arrives or the shell side of the channel goes away
async fn kill_requested(channel: &mut SupervisionChannel) {
    loop {
        match channel.recv().await {
            Ok(Some(ControlMessage::Kill)) => return,
            Ok(Some(other)) => tracing::debug!(msg = ?other, "Ignoring control message"),
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(error = %e, "Supervision channel lost");
                return;
            }
        }
    }
}
