//! Plugin options shared by every stream a worker resolves

use serde::{Deserialize, Serialize};

/// Service credentials handed to plugins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub jtv_cookie: Option<String>,
    pub gomtv_cookie: Option<String>,
    pub gomtv_username: Option<String>,
    pub gomtv_password: Option<String>,
}

impl Credentials {
    /// Command-line flags understood by livestreamer-style resolver programs
    pub fn as_args(&self) -> Vec<String> {
        let fields = [
            ("--jtv-cookie", &self.jtv_cookie),
            ("--gomtv-cookie", &self.gomtv_cookie),
            ("--gomtv-username", &self.gomtv_username),
            ("--gomtv-password", &self.gomtv_password),
        ];

        let mut args = Vec::new();
        for (flag, value) in fields {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }
        args
    }
}

/// Options that influence how plugins list and open streams
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginOptions {
    pub credentials: Credentials,

    /// Path to rtmpdump (default: looked up on PATH)
    pub rtmpdump: Option<String>,

    /// Keep the stderr of stream programs in a temporary file
    pub errorlog: bool,

    /// External resolver program for service URLs (e.g. `livestreamer`)
    pub external_resolver: Option<String>,
}

impl PluginOptions {
    /// rtmpdump program to run
    pub fn rtmpdump_program(&self) -> &str {
        match self.rtmpdump.as_deref() {
            Some(path) => path,
            None if cfg!(windows) => "rtmpdump.exe",
            None => "rtmpdump",
        }
    }
}
