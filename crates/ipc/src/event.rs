use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Response;

/// The worker processes a session can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Analysis worker for the project's primary (non-Java) language.
    Primary,
    /// Analysis worker for Java sources.
    Java,
    Debugger,
    Indexer,
    Docs,
}

impl WorkerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerKind::Primary => "primary",
            WorkerKind::Java => "java",
            WorkerKind::Debugger => "debugger",
            WorkerKind::Indexer => "indexer",
            WorkerKind::Docs => "docs",
        }
    }

    pub fn is_analysis(self) -> bool {
        matches!(self, WorkerKind::Primary | WorkerKind::Java)
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can travel from the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Response(Response),
    Notification {
        method: String,
        #[serde(default)]
        params: Value,
    },
    /// A single worker finished starting. Analysis workers' readiness is
    /// merged before it reaches the client.
    Ready { worker: WorkerKind },
    /// All analysis workers are ready.
    AnalysisReady { workers: Vec<WorkerKind> },
    /// The search index finished its startup refresh.
    IndexReady { deleted: usize, inserted: usize },
}

impl Event {
    pub fn response_id(&self) -> Option<&str> {
        match self {
            Event::Response(response) => Some(&response.id),
            _ => None,
        }
    }
}

impl From<Response> for Event {
    fn from(response: Response) -> Self {
        Event::Response(response)
    }
}
