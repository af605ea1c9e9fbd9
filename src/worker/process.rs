//! Worker process entry point
//!
//! The shell re-executes its own binary with the hidden `worker`
//! sub-command. The request travels as JSON in [`REQUEST_ENV`], the
//! supervision channel address on the command line.

use std::net::SocketAddr;

use tracing::Instrument;

use crate::channel::SupervisionChannel;
use crate::error::ConfigError;
use crate::logging;
use crate::resolver::Session;

use super::request::StreamRequest;
use super::runner::StreamWorker;
use super::state::EXIT_FAILED;

/// Environment variable carrying the JSON-encoded [`StreamRequest`]
pub const REQUEST_ENV: &str = "LSMGR_REQUEST";

pub fn encode_request(request: &StreamRequest) -> Result<String, ConfigError> {
    serde_json::to_string(request).map_err(|e| ConfigError::InvalidRequest(e.to_string()))
}

pub fn decode_request(json: &str) -> Result<StreamRequest, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::InvalidRequest(e.to_string()))
}

/// Read the request handed over by the shell
pub fn request_from_env() -> Result<StreamRequest, ConfigError> {
    let json = std::env::var(REQUEST_ENV)
        .map_err(|e| ConfigError::InvalidRequest(format!("{}: {}", REQUEST_ENV, e)))?;
    decode_request(&json)
}

/// Run worker `id` and return its process exit code
pub async fn run_process(id: u32, channel_addr: SocketAddr) -> i32 {
    let request = match request_from_env() {
        Ok(request) => request,
        Err(e) => {
            logging::init(Default::default());
            tracing::error!(worker = id, "{}", e);
            return EXIT_FAILED;
        }
    };
    logging::init(request.loglevel);

    // Interrupts are the shell's business; it kills us over the channel.
    #[cfg(unix)]
    let _sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt());

    let span = tracing::info_span!("worker", id);
    async move {
        let channel = match SupervisionChannel::connect(channel_addr).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(addr = %channel_addr, error = %e, "Unable to reach the shell");
                return EXIT_FAILED;
            }
        };

        let session = Session::new(request.options.clone());
        let outcome = StreamWorker::new(request, channel).run(&session).await;
        tracing::debug!(status = %outcome.status(), "Worker done");
        outcome.exit_code()
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let request = StreamRequest::new("file:///tmp/x").quality("source");
        let json = encode_request(&request).unwrap();
        assert_eq!(decode_request(&json).unwrap(), request);
    }

    #[test]
    fn test_garbage_request_rejected() {
        assert!(matches!(
            decode_request("{\"url\": 3}"),
            Err(ConfigError::InvalidRequest(_))
        ));
    }
}
