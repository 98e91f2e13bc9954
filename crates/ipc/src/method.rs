use serde::{Deserialize, Serialize};

/// Every method a client may send.
///
/// The string form is the `method` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    // Session
    Handshake, Shutdown,
    // Analysis
    CompilerRestart, Analyze, AnalyzeBatch,
    // Other workers
    Debug, Search, Docs,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::Handshake,
        Method::Shutdown,
        Method::CompilerRestart,
        Method::Analyze,
        Method::AnalyzeBatch,
        Method::Debug,
        Method::Search,
        Method::Docs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Handshake => "handshake",
            Method::Shutdown => "shutdown",
            Method::CompilerRestart => "compiler_restart",
            Method::Analyze => "analyze",
            Method::AnalyzeBatch => "analyze_batch",
            Method::Debug => "debug",
            Method::Search => "search",
            Method::Docs => "docs",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
