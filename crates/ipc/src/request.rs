use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};
use serde_json::Value;

use crate::{Method, SourceFile};

/// Client-chosen request identifier, echoed back on the response.
pub type RequestId = String;

/// An inbound request: `{"id": .., "method": .., "params": ..}` on the wire.
///
/// Methods the server does not know still parse, into
/// [`RequestData::Unknown`], so the router can answer them with an error
/// instead of the transport dropping the line.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub data: RequestData,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, data: RequestData) -> Self {
        Self { id: id.into(), data }
    }

    pub fn method_name(&self) -> &str {
        self.data.method_name()
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    id: RequestId,
    method: String,
    #[serde(default)]
    params: Value,
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let params = self.data.params().map_err(ser::Error::custom)?;
        Envelope {
            id: self.id.clone(),
            method: self.data.method_name().to_string(),
            params,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Request {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = Envelope::deserialize(deserializer)?;
        let data = RequestData::from_parts(&envelope.method, envelope.params).map_err(de::Error::custom)?;
        Ok(Self { id: envelope.id, data })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestData {
    Handshake(HandshakeParams),
    Shutdown(ShutdownParams),
    CompilerRestart(CompilerRestartParams),
    Analyze(AnalyzeParams),
    AnalyzeBatch(AnalyzeBatchParams),
    Debug(DebugParams),
    Search(SearchParams),
    Docs(DocsParams),
    Unknown { method: String, params: Value },
}

impl RequestData {
    pub fn method(&self) -> Option<Method> {
        Some(match self {
            Self::Handshake(_) => Method::Handshake,
            Self::Shutdown(_) => Method::Shutdown,
            Self::CompilerRestart(_) => Method::CompilerRestart,
            Self::Analyze(_) => Method::Analyze,
            Self::AnalyzeBatch(_) => Method::AnalyzeBatch,
            Self::Debug(_) => Method::Debug,
            Self::Search(_) => Method::Search,
            Self::Docs(_) => Method::Docs,
            Self::Unknown { .. } => return None,
        })
    }

    pub fn method_name(&self) -> &str {
        match self {
            Self::Unknown { method, .. } => method,
            known => known.method().map(Method::as_str).unwrap_or_default(),
        }
    }

    /// Build typed request data from a method name and raw params.
    ///
    /// Absent params are treated as an empty object so methods whose
    /// params are all optional can omit them.
    pub fn from_parts(method: &str, params: Value) -> Result<Self, serde_json::Error> {
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };

        let Some(known) = Method::parse(method) else {
            return Ok(Self::Unknown {
                method: method.to_string(),
                params,
            });
        };

        Ok(match known {
            Method::Handshake => Self::Handshake(serde_json::from_value(params)?),
            Method::Shutdown => Self::Shutdown(serde_json::from_value(params)?),
            Method::CompilerRestart => Self::CompilerRestart(serde_json::from_value(params)?),
            Method::Analyze => Self::Analyze(serde_json::from_value(params)?),
            Method::AnalyzeBatch => Self::AnalyzeBatch(serde_json::from_value(params)?),
            Method::Debug => Self::Debug(serde_json::from_value(params)?),
            Method::Search => Self::Search(serde_json::from_value(params)?),
            Method::Docs => Self::Docs(serde_json::from_value(params)?),
        })
    }

    fn params(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Handshake(p) => serde_json::to_value(p),
            Self::Shutdown(p) => serde_json::to_value(p),
            Self::CompilerRestart(p) => serde_json::to_value(p),
            Self::Analyze(p) => serde_json::to_value(p),
            Self::AnalyzeBatch(p) => serde_json::to_value(p),
            Self::Debug(p) => serde_json::to_value(p),
            Self::Search(p) => serde_json::to_value(p),
            Self::Docs(p) => serde_json::to_value(p),
            Self::Unknown { params, .. } => Ok(params.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HandshakeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownParams {
    #[serde(default = "default_shutdown_reason")]
    pub reason: String,
    #[serde(default)]
    pub error: bool,
}

fn default_shutdown_reason() -> String {
    "client requested shutdown".to_string()
}

impl Default for ShutdownParams {
    fn default() -> Self {
        Self {
            reason: default_shutdown_reason(),
            error: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReloadStrategy {
    #[default]
    Incremental,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompilerRestartParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub strategy: ReloadStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Diagnostics,
    Hover,
    Definition,
    References,
    Completion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeParams {
    pub kind: AnalysisKind,
    pub file: SourceFile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeBatchParams {
    pub kind: AnalysisKind,
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugParams {
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocsParams {
    pub symbol: String,
}
