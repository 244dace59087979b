// MCP tool definitions and handlers

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{PrismError, Result};
use crate::query::{
    GetMemberRequest, GetTypeRequest, HierarchyRequest, ListTypesRequest, QueryEngine,
    ReadSourceRequest, SearchRequest,
};

/// MCP tool definition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NamespaceArgs {
    namespace: Option<String>,
}

fn namespace_property() -> Value {
    json!({
        "type": "string",
        "description": "Index namespace; defaults to the configured namespace"
    })
}

/// Every tool the server exposes
pub fn definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "prism_search",
            description: "Full-text search over indexed type and method signatures. Supports FTS5 syntax (phrases, AND/OR/NOT, prefix*).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "term": { "type": "string", "description": "Search expression" },
                    "namespace": namespace_property(),
                    "limit": { "type": "integer", "default": 30, "description": "Maximum rows (1-500)" },
                    "packagePrefix": { "type": "string", "description": "Restrict to a package and its subpackages" },
                    "kind": { "type": "string", "enum": ["class", "interface", "record", "enum"] },
                    "dedupe": { "type": "boolean", "default": false, "description": "One row per type with a match count (approximate)" }
                },
                "required": ["term"]
            }),
        },
        Tool {
            name: "prism_get_type",
            description: "Get a type with all of its public methods.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "namespace": namespace_property(),
                    "package": { "type": "string" },
                    "typeName": { "type": "string" },
                    "fqcn": { "type": "string", "description": "Qualified name, used when package/typeName are omitted" }
                }
            }),
        },
        Tool {
            name: "prism_get_member",
            description: "Get every overload of a method on a type.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "namespace": namespace_property(),
                    "package": { "type": "string" },
                    "typeName": { "type": "string" },
                    "memberName": { "type": "string" }
                },
                "required": ["package", "typeName", "memberName"]
            }),
        },
        Tool {
            name: "prism_list_types",
            description: "List types in a package, optionally including subpackages.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "namespace": namespace_property(),
                    "packagePrefix": { "type": "string" },
                    "prefixMatch": { "type": "boolean", "default": true },
                    "limit": { "type": "integer", "default": 100 },
                    "offset": { "type": "integer", "default": 0 }
                },
                "required": ["packagePrefix"]
            }),
        },
        Tool {
            name: "prism_hierarchy",
            description: "Resolve the parent chain and interfaces of a type.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "namespace": namespace_property(),
                    "package": { "type": "string" },
                    "typeName": { "type": "string" }
                },
                "required": ["package", "typeName"]
            }),
        },
        Tool {
            name: "prism_index_stats",
            description: "Type and method counts of an indexed namespace.",
            input_schema: json!({
                "type": "object",
                "properties": { "namespace": namespace_property() }
            }),
        },
        Tool {
            name: "prism_context_list",
            description: "List indexed namespaces and the default namespace.",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        Tool {
            name: "prism_read_source",
            description: "Read lines of a source file, path relative to the namespace source root.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "namespace": namespace_property(),
                    "path": { "type": "string" },
                    "startLine": { "type": "integer", "description": "1-based, inclusive" },
                    "endLine": { "type": "integer", "description": "1-based, inclusive" }
                },
                "required": ["path"]
            }),
        },
        Tool {
            name: "prism_search_help",
            description: "Describe the search expression syntax.",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
    ]
}

pub fn is_known(name: &str) -> bool {
    definitions().iter().any(|tool| tool.name == name)
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| PrismError::InvalidRequest(format!("invalid arguments: {}", e)))
}

/// Run a tool and wrap its outcome as MCP text content
pub fn call(engine: &QueryEngine, name: &str, args: Value) -> Value {
    debug!("Calling tool {}", name);

    let outcome = match name {
        "prism_search" => parse_args::<SearchRequest>(args).and_then(|r| to_json(engine.search(&r))),
        "prism_get_type" => parse_args::<GetTypeRequest>(args).and_then(|r| to_json(engine.get_type(&r))),
        "prism_get_member" => parse_args::<GetMemberRequest>(args).and_then(|r| to_json(engine.get_member(&r))),
        "prism_list_types" => parse_args::<ListTypesRequest>(args).and_then(|r| to_json(engine.list_types(&r))),
        "prism_hierarchy" => parse_args::<HierarchyRequest>(args).and_then(|r| to_json(engine.hierarchy(&r))),
        "prism_index_stats" => {
            parse_args::<NamespaceArgs>(args).and_then(|r| to_json(engine.stats(r.namespace.as_deref())))
        }
        "prism_context_list" => to_json(engine.context_list()),
        "prism_read_source" => parse_args::<ReadSourceRequest>(args).and_then(|r| to_json(engine.read_source(&r))),
        "prism_search_help" => to_json(Ok(engine.search_help())),
        other => Err(PrismError::InvalidRequest(format!("unknown tool '{}'", other))),
    };

    match outcome {
        Ok(value) => content(&value, false),
        Err(e) => {
            warn!("Tool {} failed: {}", name, e);
            content(&json!(e.payload()), true)
        }
    }
}

fn to_json<T: Serialize>(result: Result<T>) -> Result<Value> {
    Ok(serde_json::to_value(result?)?)
}

fn content(value: &Value, is_error: bool) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": serde_json::to_string_pretty(value).unwrap_or_default()
        }],
        "isError": is_error
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn engine() -> (tempfile::TempDir, QueryEngine) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.project.root = dir.path().to_string_lossy().to_string();
        (dir, QueryEngine::new(config))
    }

    fn payload(result: &Value) -> Value {
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap()
    }

    #[test]
    fn test_definitions_are_unique() {
        let tools = definitions();
        assert_eq!(tools.len(), 9);
        let mut names: Vec<_> = tools.iter().map(|t| t.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 9);

        let json = serde_json::to_value(&tools[0]).unwrap();
        assert!(json.get("inputSchema").is_some());
    }

    #[test]
    fn test_search_help() {
        let (_dir, engine) = engine();
        let result = call(&engine, "prism_search_help", Value::Null);
        assert_eq!(result["isError"], false);
        assert!(payload(&result)["help"].as_str().unwrap().contains("AND"));
    }

    #[test]
    fn test_no_index_is_structured_error() {
        let (_dir, engine) = engine();
        let result = call(&engine, "prism_get_type", json!({ "fqcn": "a.b.C" }));
        assert_eq!(result["isError"], true);
        assert_eq!(payload(&result)["error"], "no_index");
        assert!(payload(&result)["hint"].is_string());
    }

    #[test]
    fn test_bad_arguments_are_invalid_request() {
        let (_dir, engine) = engine();
        let result = call(&engine, "prism_search", json!({ "term": 42 }));
        assert_eq!(result["isError"], true);
        assert_eq!(payload(&result)["error"], "invalid_request");
    }

    #[test]
    fn test_unencodable_response_is_an_error() {
        let mut pairs = std::collections::HashMap::new();
        pairs.insert((1, 2), "tuple keys have no JSON form");

        let err = to_json(Ok(pairs)).unwrap_err();
        assert_eq!(err.kind(), "internal_error");

        let result = content(&json!(err.payload()), true);
        assert_eq!(result["isError"], true);
        assert_eq!(payload(&result)["error"], "internal_error");
    }

    #[test]
    fn test_context_list_without_indexes() {
        let (_dir, engine) = engine();
        let result = call(&engine, "prism_context_list", json!({}));
        let body = payload(&result);
        assert_eq!(body["indexed"], json!([]));
        assert_eq!(body["default"], "release");
    }
}
