//! Built-in plugins and the resolver session
//!
//! Plugins are tried in order and the first one accepting the URL wins:
//!
//! | plugin     | URLs                         | qualities                     |
//! |------------|------------------------------|-------------------------------|
//! | `file`     | `file://<path>`              | `source`, or one per file in a directory |
//! | `http`     | `httpstream://<url>`         | `live`                        |
//! | `rtmp`     | `rtmp://…`, `rtmpe://…`, …   | `live` (via rtmpdump)         |
//! | `external` | `http(s)://…`                | whatever the resolver program lists |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::ResolveError;
use super::options::PluginOptions;
use super::stream::{ProcessStream, Stream};
use super::{PluginHandle, Resolver, Streams};

const FILE_PREFIX: &str = "file://";
const HTTP_PREFIX: &str = "httpstream://";

/// Built-in plugin kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plugin {
    File,
    Http,
    Rtmp,
    External,
}

impl Plugin {
    /// All plugins in resolution order
    pub const ALL: [Plugin; 4] = [Plugin::File, Plugin::Http, Plugin::Rtmp, Plugin::External];

    pub fn name(&self) -> &'static str {
        match self {
            Plugin::File => "file",
            Plugin::Http => "http",
            Plugin::Rtmp => "rtmp",
            Plugin::External => "external",
        }
    }

    /// Whether this plugin accepts `url`
    pub fn can_handle(&self, url: &str, options: &PluginOptions) -> bool {
        match self {
            Plugin::File => url.starts_with(FILE_PREFIX),
            Plugin::Http => url.starts_with(HTTP_PREFIX),
            Plugin::Rtmp => url.starts_with("rtmp") && url.contains("://"),
            Plugin::External => {
                (url.starts_with("http://") || url.starts_with("https://"))
                    && options
                        .external_resolver
                        .as_deref()
                        .is_some_and(|program| which::which(program).is_ok())
            }
        }
    }

    async fn streams(&self, url: &str, options: &PluginOptions) -> Result<Streams, ResolveError> {
        match self {
            Plugin::File => file_streams(Path::new(&url[FILE_PREFIX.len()..])).await,
            Plugin::Http => {
                let target = &url[HTTP_PREFIX.len()..];
                let target = if target.contains("://") {
                    target.to_string()
                } else {
                    format!("http://{}", target)
                };
                Ok(single("live", Stream::Http { url: target }))
            }
            Plugin::Rtmp => {
                let mut args = vec!["-r".to_string(), url.to_string(), "--flv".into(), "-".into()];
                if let Some(cookie) = &options.credentials.jtv_cookie {
                    args.push("--jtv".into());
                    args.push(cookie.clone());
                }
                let mut process = ProcessStream::new(options.rtmpdump_program(), args);
                process.errorlog = options.errorlog;
                if options.credentials.jtv_cookie.is_some() {
                    process.requires_flag = Some("--jtv".into());
                }
                Ok(single("live", Stream::Process(process)))
            }
            Plugin::External => external_streams(url, options).await,
        }
    }
}

fn single(name: &str, stream: Stream) -> Streams {
    let mut streams = BTreeMap::new();
    streams.insert(name.to_string(), stream);
    streams
}

async fn file_streams(path: &Path) -> Result<Streams, ResolveError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ResolveError::Plugin(format!("Unable to open {}: {}", path.display(), e)))?;

    if !meta.is_dir() {
        return Ok(single(
            "source",
            Stream::File {
                path: path.to_path_buf(),
            },
        ));
    }

    let mut streams = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| ResolveError::Plugin(format!("Unable to list {}: {}", path.display(), e)))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ResolveError::Plugin(e.to_string()))?
    {
        let file_path: PathBuf = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(stem) = file_path.file_stem().and_then(|s| s.to_str()) {
            streams.insert(stem.to_string(), Stream::File { path: file_path.clone() });
        }
    }

    Ok(streams)
}

#[derive(Debug, Deserialize)]
struct ExternalListing {
    #[serde(default)]
    streams: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

async fn external_streams(url: &str, options: &PluginOptions) -> Result<Streams, ResolveError> {
    let program = options
        .external_resolver
        .clone()
        .ok_or_else(|| ResolveError::NoPluginFound(url.to_string()))?;
    let credential_args = options.credentials.as_args();

    let output = tokio::process::Command::new(&program)
        .args(&credential_args)
        .arg("--json")
        .arg(url)
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| ResolveError::Plugin(format!("Unable to run {}: {}", program, e)))?;

    let listing: ExternalListing = serde_json::from_slice(&output.stdout).map_err(|e| {
        ResolveError::Plugin(format!("Unexpected output from {}: {}", program, e))
    })?;

    if let Some(error) = listing.error {
        return Err(ResolveError::Plugin(error));
    }

    let streams = listing
        .streams
        .into_keys()
        .map(|name| {
            let mut args = credential_args.clone();
            args.extend(["--stdout".to_string(), url.to_string(), name.clone()]);
            let mut process = ProcessStream::new(program.clone(), args);
            process.errorlog = options.errorlog;
            (name, Stream::Process(process))
        })
        .collect();

    Ok(streams)
}

/// Resolver backed by the built-in plugin set
#[derive(Debug, Clone, Default)]
pub struct Session {
    options: PluginOptions,
}

impl Session {
    pub fn new(options: PluginOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }
}

impl Resolver for Session {
    type Handle = ResolvedUrl;

    fn resolve(&self, url: &str) -> Result<ResolvedUrl, ResolveError> {
        Plugin::ALL
            .into_iter()
            .find(|plugin| plugin.can_handle(url, &self.options))
            .map(|plugin| ResolvedUrl {
                plugin,
                url: url.to_string(),
                options: self.options.clone(),
            })
            .ok_or_else(|| ResolveError::NoPluginFound(url.to_string()))
    }
}

/// A URL matched by one of the built-in plugins
#[derive(Debug, Clone)]
pub struct ResolvedUrl {
    plugin: Plugin,
    url: String,
    options: PluginOptions,
}

impl ResolvedUrl {
    pub fn plugin(&self) -> Plugin {
        self.plugin
    }
}

impl PluginHandle for ResolvedUrl {
    fn plugin_name(&self) -> &str {
        self.plugin.name()
    }

    async fn streams(&self) -> Result<Streams, ResolveError> {
        self.plugin.streams(&self.url, &self.options).await
    }
}
