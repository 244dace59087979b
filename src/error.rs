// Error taxonomy shared by the indexer, the store and the query layer

use serde::Serialize;
use std::path::PathBuf;

/// Hint attached to full-text syntax errors and served by the search help tool.
pub const SEARCH_SYNTAX_HELP: &str = "FTS5 search syntax:\n\
- Single word: matches that token (e.g. GameManager).\n\
- Quoted phrase: \"exact phrase\" matches the tokens in order.\n\
- AND: term1 AND term2 (both must appear).\n\
- OR: term1 OR term2 (either can appear).\n\
- NOT: term1 NOT term2 (first without the second).\n\
- Prefix: term* matches tokens starting with 'term'.\n\
Examples: GameManager, \"getPlayer\" AND server, spawn OR despawn, get*";

pub type Result<T> = std::result::Result<T, PrismError>;

#[derive(Debug, thiserror::Error)]
pub enum PrismError {
    #[error("namespace '{namespace}' has not been indexed yet")]
    NoIndex { namespace: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("invalid search expression: {message}")]
    QuerySyntax { message: String, hint: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cannot read source file {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Structured error returned to CLI and MCP callers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    #[serde(rename = "error")]
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl PrismError {
    pub fn no_index(namespace: impl Into<String>) -> Self {
        Self::NoIndex { namespace: namespace.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn query_syntax(message: impl Into<String>) -> Self {
        Self::QuerySyntax {
            message: message.into(),
            hint: SEARCH_SYNTAX_HELP.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PrismError::NoIndex { .. } => "no_index",
            PrismError::NotFound { .. } => "not_found",
            PrismError::QuerySyntax { .. } => "query_syntax_error",
            PrismError::InvalidRequest(_) => "invalid_request",
            PrismError::Store(_) | PrismError::Pool(_) | PrismError::Io(_) => "store_error",
            PrismError::SourceUnreadable { .. } => "source_unreadable",
            PrismError::Encode(_) => "internal_error",
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        let hint = match self {
            PrismError::QuerySyntax { hint, .. } => Some(hint.clone()),
            PrismError::NoIndex { namespace } => {
                Some(format!("Run `prism index --namespace {}` first.", namespace))
            }
            _ => None,
        };

        ErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
            hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(PrismError::no_index("release").kind(), "no_index");
        assert_eq!(PrismError::not_found("type a.B").kind(), "not_found");
        assert_eq!(PrismError::query_syntax("bad").kind(), "query_syntax_error");
        assert_eq!(PrismError::InvalidRequest("x".into()).kind(), "invalid_request");

        let encode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(PrismError::from(encode).kind(), "internal_error");
    }

    #[test]
    fn test_syntax_payload_has_hint() {
        let payload = PrismError::query_syntax("unterminated string").payload();
        assert_eq!(payload.kind, "query_syntax_error");
        assert!(payload.hint.as_deref().is_some_and(|h| !h.is_empty()));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["error"], "query_syntax_error");
    }

    #[test]
    fn test_not_found_payload_omits_hint() {
        let json = serde_json::to_value(PrismError::not_found("type a.B").payload()).unwrap();
        assert_eq!(json["error"], "not_found");
        assert!(json.get("hint").is_none());
    }
}
