// Read-side services: lookups, listing, search and hierarchy

pub mod engine;
pub mod hierarchy;

pub use engine::QueryEngine;

use serde::{Deserialize, Serialize};

use crate::index::db::{SearchHit, TypeDetail, TypeSummary};
use crate::index::MemberRecord;
use hierarchy::Hierarchy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub term: String,
    pub namespace: Option<String>,
    pub limit: Option<i64>,
    pub package_prefix: Option<String>,
    pub kind: Option<String>,
    /// Collapse to one row per type
    pub dedupe: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetTypeRequest {
    pub namespace: Option<String>,
    pub package: Option<String>,
    pub type_name: Option<String>,
    /// `pkg.Name`, used when package/typeName are not given
    pub fqcn: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetMemberRequest {
    pub namespace: Option<String>,
    pub package: String,
    pub type_name: String,
    pub member_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListTypesRequest {
    pub namespace: Option<String>,
    pub package_prefix: String,
    /// Include subpackages
    pub prefix_match: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Default for ListTypesRequest {
    fn default() -> Self {
        Self {
            namespace: None,
            package_prefix: String::new(),
            prefix_match: true,
            limit: None,
            offset: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HierarchyRequest {
    pub namespace: Option<String>,
    pub package: String,
    pub type_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadSourceRequest {
    pub namespace: Option<String>,
    /// Relative to the namespace source root
    pub path: String,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub namespace: String,
    pub term: String,
    pub count: usize,
    pub results: Vec<SearchHit>,
    /// Set when results were collapsed per type from an over-fetched window
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub approximate: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeResponse {
    pub namespace: String,
    #[serde(flatten)]
    pub detail: TypeDetail,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub namespace: String,
    pub package: String,
    pub type_name: String,
    pub member_name: String,
    pub count: usize,
    pub members: Vec<MemberRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTypesResponse {
    pub namespace: String,
    pub package_prefix: String,
    pub prefix_match: bool,
    pub limit: usize,
    pub offset: usize,
    pub count: usize,
    pub types: Vec<TypeSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyResponse {
    pub namespace: String,
    #[serde(flatten)]
    pub hierarchy: Hierarchy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub namespace: String,
    pub type_count: usize,
    pub member_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_indexed: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextListResponse {
    /// Namespaces with a ready store
    pub indexed: Vec<String>,
    pub default: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResponse {
    pub namespace: String,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub total_lines: usize,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHelpResponse {
    pub help: &'static str,
}
