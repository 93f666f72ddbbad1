//! Bridge protocol definitions.
//!
//! This module defines the envelopes exchanged between [`SpotClient`] and the
//! server loop running inside the container.
//!
//! [`SpotClient`]: crate::client::SpotClient
//!
//! # Protocol Format
//!
//! - **Transport**: TCP, one peer at a time
//! - **Encoding**: JSON
//! - **Framing**: 4-byte big-endian length prefix (see [`crate::transport`])
//!
//! # Request/Response Flow
//!
//! ```text
//! Client                                        Server
//!   |                                             |
//!   |  {"query":"spot.mp_class",                  |
//!   |   "params":{"formula":"G(a -> Fb)"}}        |
//!   |-------------------------------------------->|
//!   |                                             |
//!   |  {"response":{...echoed request...},        |
//!   |   "status-code":200,"result":"recurrence"}  |
//!   |<--------------------------------------------|
//! ```
//!
//! # Supported Queries
//!
//! | Query | Params | Result |
//! |-------|--------|--------|
//! | `spot.mp_class` | `formula` | Manna-Pnueli class name |
//! | `spot.translate` | `formula` | automaton graph (see [`crate::graph`]) |
//! | `spot.contains` | `formula1`, `formula2` | `true` iff L(formula2) ⊆ L(formula1) |
//! | `spot.equiv` | `formula1`, `formula2` | `true` iff the languages are equal |
//! | `spot.randLtl` | `numAP`, `seed` | random formula |
//! | `spot.getAP` | `formula` | atomic proposition names |
//! | `spot.toStringLatex` | `formula` | LaTeX rendering |
//! | `spot.ping` | none | server version |
//!
//! # Status Codes
//!
//! | Code | Meaning | `result` |
//! |------|---------|----------|
//! | 200 | success | operation payload |
//! | 400 | unsupported query or malformed params | diagnostic string |
//! | 500 | the engine failed while handling the query | diagnostic string |

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

// =============================================================================
// Status Codes
// =============================================================================

/// Outcome of a request as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum StatusCode {
    /// The query succeeded and `result` holds its payload.
    Ok,
    /// The query name is unknown or its params are malformed.
    InvalidQuery,
    /// The handler failed while executing the query.
    ExecutionError,
}

impl StatusCode {
    /// Returns the numeric wire value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::InvalidQuery => 400,
            Self::ExecutionError => 500,
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> Self {
        code.as_u16()
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = String;

    fn try_from(code: u16) -> std::result::Result<Self, Self::Error> {
        match code {
            200 => Ok(Self::Ok),
            400 => Ok(Self::InvalidQuery),
            500 => Ok(Self::ExecutionError),
            other => Err(format!("unknown status code {other}")),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

// =============================================================================
// Envelopes
// =============================================================================

/// Untyped request as it travels on the wire.
///
/// The server parses this first so that it can answer unknown query names
/// with a 400 instead of dropping the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Namespaced operation name (`spot.<function>`).
    pub query: String,
    /// Operation parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl RequestEnvelope {
    /// Creates an envelope with no params.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Map::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Serializes the envelope for a single frame.
    ///
    /// # Errors
    ///
    /// Returns error if JSON serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl fmt::Display for RequestEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{{\"query\":\"{}\"}}", self.query),
        }
    }
}

/// Reply to a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// The request this answers, echoed exactly as received.
    #[serde(rename = "response")]
    pub request: Value,
    /// Outcome of the request.
    #[serde(rename = "status-code")]
    pub status: StatusCode,
    /// Payload on success, diagnostic string otherwise.
    #[serde(default)]
    pub result: Value,
}

impl ResponseEnvelope {
    /// Creates a success response.
    #[must_use]
    pub fn ok(request: Value, result: Value) -> Self {
        Self {
            request,
            status: StatusCode::Ok,
            result,
        }
    }

    /// Creates a 400 response.
    #[must_use]
    pub fn invalid_query(request: Value, message: impl Into<String>) -> Self {
        Self {
            request,
            status: StatusCode::InvalidQuery,
            result: Value::String(diagnostic(message.into())),
        }
    }

    /// Creates a 500 response.
    #[must_use]
    pub fn execution_error(request: Value, message: impl Into<String>) -> Self {
        Self {
            request,
            status: StatusCode::ExecutionError,
            result: Value::String(diagnostic(message.into())),
        }
    }

    /// Returns true if this is a success response.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Ok
    }

    /// Returns the diagnostic carried by a non-success response.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match &self.result {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Serializes the response for a single frame.
    ///
    /// Falls back to a fixed 500 reply if the payload cannot be serialized,
    /// so the server always has something to send.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|e| {
            let fallback = Self::execution_error(
                self.request.clone(),
                format!("failed to serialize response: {e}"),
            );
            serde_json::to_vec(&fallback).unwrap_or_else(|_| {
                br#"{"response":null,"status-code":500,"result":"serialization failed"}"#.to_vec()
            })
        })
    }

    /// Deserializes a response from a frame.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid response envelope.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

fn diagnostic(message: String) -> String {
    if message.trim().is_empty() {
        "unknown error".to_string()
    } else {
        message
    }
}

// =============================================================================
// Typed Queries
// =============================================================================

/// Parameters of single-formula queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaParams {
    /// Formula text, opaque to the bridge.
    pub formula: String,
}

/// Parameters of two-formula queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaPairParams {
    /// Left-hand formula.
    pub formula1: String,
    /// Right-hand formula.
    pub formula2: String,
}

/// Parameters of `spot.randLtl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandLtlParams {
    /// Number of atomic propositions to draw from.
    #[serde(rename = "numAP")]
    pub num_ap: u32,
    /// Seed for the generator.
    pub seed: u64,
}

/// Parameters of queries that take none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoParams {}

/// The closed set of operations the server implements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", content = "params")]
pub enum Query {
    /// Manna-Pnueli class of a formula.
    #[serde(rename = "spot.mp_class")]
    MpClass(FormulaParams),

    /// Translate a formula to a Büchi automaton.
    #[serde(rename = "spot.translate")]
    Translate(FormulaParams),

    /// Language containment: L(formula2) ⊆ L(formula1).
    #[serde(rename = "spot.contains")]
    Contains(FormulaPairParams),

    /// Language equivalence.
    #[serde(rename = "spot.equiv")]
    Equiv(FormulaPairParams),

    /// Random formula over `numAP` propositions.
    #[serde(rename = "spot.randLtl")]
    RandLtl(RandLtlParams),

    /// Atomic propositions used by a formula.
    #[serde(rename = "spot.getAP")]
    GetAp(FormulaParams),

    /// LaTeX rendering of a formula.
    #[serde(rename = "spot.toStringLatex")]
    ToLatex(FormulaParams),

    /// Liveness check.
    #[serde(rename = "spot.ping")]
    Ping(NoParams),
}

/// Every query name the server accepts.
pub const OPERATIONS: [&str; 8] = [
    "spot.mp_class",
    "spot.translate",
    "spot.contains",
    "spot.equiv",
    "spot.randLtl",
    "spot.getAP",
    "spot.toStringLatex",
    "spot.ping",
];

/// Why a request envelope could not be turned into a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The query name is not in [`OPERATIONS`].
    Unsupported(String),
    /// The name is known but the params do not fit.
    InvalidParams { query: String, reason: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(query) => write!(f, "{query} functionality is not supported."),
            Self::InvalidParams { query, reason } => {
                write!(f, "invalid parameters for {query}: {reason}")
            }
        }
    }
}

impl Query {
    /// Returns the wire name of this query.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::MpClass(_) => "spot.mp_class",
            Self::Translate(_) => "spot.translate",
            Self::Contains(_) => "spot.contains",
            Self::Equiv(_) => "spot.equiv",
            Self::RandLtl(_) => "spot.randLtl",
            Self::GetAp(_) => "spot.getAP",
            Self::ToLatex(_) => "spot.toStringLatex",
            Self::Ping(_) => "spot.ping",
        }
    }

    /// Returns true if `name` is a supported query name.
    #[must_use]
    pub fn is_supported(name: &str) -> bool {
        OPERATIONS.contains(&name)
    }

    /// Builds the wire envelope for this query.
    ///
    /// # Errors
    ///
    /// Returns error if JSON serialization fails.
    pub fn to_envelope(&self) -> Result<RequestEnvelope> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Parses a wire envelope into a typed query.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::Unsupported`] for unknown names and
    /// [`Rejection::InvalidParams`] when the params do not match.
    pub fn from_envelope(envelope: &RequestEnvelope) -> std::result::Result<Self, Rejection> {
        if !Self::is_supported(&envelope.query) {
            return Err(Rejection::Unsupported(envelope.query.clone()));
        }

        let mut tagged = Map::new();
        tagged.insert("query".into(), Value::String(envelope.query.clone()));
        tagged.insert("params".into(), Value::Object(envelope.params.clone()));

        serde_json::from_value(Value::Object(tagged)).map_err(|e| Rejection::InvalidParams {
            query: envelope.query.clone(),
            reason: e.to_string(),
        })
    }
}
