// Query execution engine

use dashmap::DashMap;
use std::path::{Component, Path};
use std::time::{Duration, SystemTime};
use tracing::debug;

use super::hierarchy::resolve_ancestors;
use super::*;
use crate::config::Config;
use crate::error::{PrismError, Result, SEARCH_SYNTAX_HELP};
use crate::index::db::{meta, IndexDatabase, IndexState, SearchQuery};
use crate::index::schema::SCHEMA_VERSION;
use crate::index::{qualify, split_qualified, TypeKind};

/// Page size for type listings when the caller gives none
const DEFAULT_LIST_LIMIT: i64 = 100;

/// A read pool plus the store file's modification time when it was opened
struct CachedReader {
    db: IndexDatabase,
    modified: Option<SystemTime>,
}

/// Query engine
pub struct QueryEngine {
    config: Config,
    readers: DashMap<String, CachedReader>,
}

impl QueryEngine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            readers: DashMap::new(),
        }
    }

    /// Read-only store for a namespace. A store rewritten since it was opened
    /// is reopened; one that disappeared is evicted.
    fn reader(&self, namespace: &str) -> Result<IndexDatabase> {
        let path = self.config.db_path(namespace);
        let modified = match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata.modified().ok(),
            _ => {
                self.readers.remove(namespace);
                return Err(PrismError::no_index(namespace));
            }
        };

        if let Some(cached) = self.readers.get(namespace) {
            if cached.modified == modified {
                return Ok(cached.db.clone());
            }
        }

        debug!("Opening reader for namespace '{}'", namespace);
        let db = IndexDatabase::open_existing(
            &path,
            namespace,
            Duration::from_millis(self.config.query.busy_timeout_ms),
        )?;
        self.readers.insert(
            namespace.to_string(),
            CachedReader {
                db: db.clone(),
                modified,
            },
        );
        Ok(db)
    }

    /// Reader for a namespace whose last indexing run completed
    fn ready_reader(&self, namespace: &str) -> Result<IndexDatabase> {
        let db = self.reader(namespace)?;
        let state = db.state()?;
        if state != IndexState::Ready {
            debug!("Namespace '{}' is {}", namespace, state.as_str());
            return Err(PrismError::no_index(namespace));
        }
        if db.meta(meta::SCHEMA_VERSION)?.as_deref() != Some(SCHEMA_VERSION.to_string().as_str()) {
            debug!("Namespace '{}' was indexed under another schema", namespace);
            return Err(PrismError::no_index(namespace));
        }
        Ok(db)
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let namespace = self.config.resolve_namespace(request.namespace.as_deref())?;
        let term = request.term.trim();

        let empty = SearchResponse {
            namespace: namespace.clone(),
            term: term.to_string(),
            count: 0,
            results: Vec::new(),
            approximate: request.dedupe,
        };
        if term.is_empty() {
            return Ok(empty);
        }
        check_search_syntax(term)?;

        let kind = parse_kind(request.kind.as_deref())?;
        let limit = self.config.clamp_limit(request.limit);
        let db = self.ready_reader(&namespace)?;

        let results = db.search(&SearchQuery {
            term,
            limit,
            package_prefix: request.package_prefix.as_deref(),
            kind,
            dedupe_by_type: request.dedupe,
            overfetch: self.config.query.dedupe_overfetch,
        })?;

        Ok(SearchResponse {
            count: results.len(),
            results,
            ..empty
        })
    }

    pub fn get_type(&self, request: &GetTypeRequest) -> Result<TypeResponse> {
        let namespace = self.config.resolve_namespace(request.namespace.as_deref())?;
        let (package, type_name) = type_key(request)?;
        let db = self.ready_reader(&namespace)?;

        let detail = db.get_type_and_members(&package, &type_name)?.ok_or_else(|| {
            PrismError::not_found(format!(
                "type {} in namespace '{}'",
                qualify(&package, &type_name),
                namespace
            ))
        })?;

        Ok(TypeResponse { namespace, detail })
    }

    pub fn get_member(&self, request: &GetMemberRequest) -> Result<MemberResponse> {
        let namespace = self.config.resolve_namespace(request.namespace.as_deref())?;
        let package = required("package", &request.package)?;
        let type_name = required("typeName", &request.type_name)?;
        let member_name = required("memberName", &request.member_name)?;
        let db = self.ready_reader(&namespace)?;

        let detail = db.get_member(package, type_name, member_name)?.ok_or_else(|| {
            PrismError::not_found(format!(
                "type {} in namespace '{}'",
                qualify(package, type_name),
                namespace
            ))
        })?;

        Ok(MemberResponse {
            namespace,
            package: detail.package,
            type_name: detail.type_name,
            member_name: member_name.to_string(),
            count: detail.members.len(),
            members: detail.members,
        })
    }

    pub fn list_types(&self, request: &ListTypesRequest) -> Result<ListTypesResponse> {
        let namespace = self.config.resolve_namespace(request.namespace.as_deref())?;
        let package_prefix = required("packagePrefix", request.package_prefix.trim_end_matches('.'))?;
        let limit = self.config.clamp_limit(Some(request.limit.unwrap_or(DEFAULT_LIST_LIMIT)));
        let offset = request.offset.unwrap_or(0).max(0) as usize;
        let db = self.ready_reader(&namespace)?;

        let types = db.list_types(package_prefix, request.prefix_match, limit, offset)?;

        Ok(ListTypesResponse {
            namespace,
            package_prefix: package_prefix.to_string(),
            prefix_match: request.prefix_match,
            limit,
            offset,
            count: types.len(),
            types,
        })
    }

    pub fn hierarchy(&self, request: &HierarchyRequest) -> Result<HierarchyResponse> {
        let namespace = self.config.resolve_namespace(request.namespace.as_deref())?;
        let package = required("package", &request.package)?;
        let type_name = required("typeName", &request.type_name)?;
        let db = self.ready_reader(&namespace)?;

        let hierarchy = resolve_ancestors(&db, package, type_name)?.ok_or_else(|| {
            PrismError::not_found(format!(
                "type {} in namespace '{}'",
                qualify(package, type_name),
                namespace
            ))
        })?;

        Ok(HierarchyResponse { namespace, hierarchy })
    }

    pub fn stats(&self, namespace: Option<&str>) -> Result<StatsResponse> {
        let namespace = self.config.resolve_namespace(namespace)?;
        let db = self.ready_reader(&namespace)?;
        let stats = db.stats()?;

        Ok(StatsResponse {
            namespace,
            type_count: stats.type_count,
            member_count: stats.member_count,
            indexed_at: db.meta(meta::INDEXED_AT)?,
            files_indexed: db.meta(meta::FILES_INDEXED)?.and_then(|v| v.parse().ok()),
        })
    }

    /// Namespaces whose store file exists and holds a completed index
    pub fn context_list(&self) -> Result<ContextListResponse> {
        let mut indexed = Vec::new();

        let db_dir = self.config.db_dir();
        if db_dir.is_dir() {
            for entry in std::fs::read_dir(&db_dir)? {
                let file_name = entry?.file_name();
                let file_name = file_name.to_string_lossy();
                let Some(namespace) = file_name
                    .strip_prefix("prism_api_")
                    .and_then(|rest| rest.strip_suffix(".db"))
                else {
                    continue;
                };
                if crate::config::validate_namespace(namespace).is_err() {
                    continue;
                }
                if self.ready_reader(namespace).is_ok() {
                    indexed.push(namespace.to_string());
                }
            }
        }
        indexed.sort();

        Ok(ContextListResponse {
            indexed,
            default: self.config.namespaces.default.clone(),
        })
    }

    /// Lines of a source file under the namespace root, 1-based and inclusive
    pub fn read_source(&self, request: &ReadSourceRequest) -> Result<SourceResponse> {
        let namespace = self.config.resolve_namespace(request.namespace.as_deref())?;
        let relative = request.path.trim().replace('\\', "/");
        let relative_path = Path::new(&relative);

        let confined = !relative.is_empty()
            && relative_path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return Err(PrismError::InvalidRequest(format!(
                "source path must be relative to the namespace root: '{}'",
                request.path
            )));
        }

        let root = self.config.source_dir(&namespace);
        let root = root
            .canonicalize()
            .map_err(|_| PrismError::not_found(format!("sources for namespace '{}'", namespace)))?;
        let full = root
            .join(relative_path)
            .canonicalize()
            .map_err(|_| PrismError::not_found(format!("source file {}", relative)))?;
        if !full.starts_with(&root) {
            return Err(PrismError::InvalidRequest(format!(
                "source path escapes the namespace root: '{}'",
                request.path
            )));
        }
        if !full.is_file() {
            return Err(PrismError::not_found(format!("source file {}", relative)));
        }

        let bytes = std::fs::read(&full).map_err(|source| PrismError::SourceUnreadable {
            path: full.clone(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        let total_lines = lines.len();

        let (start_line, end_line, content) = if total_lines == 0 {
            (0, 0, String::new())
        } else {
            let start = (request.start_line.unwrap_or(1).max(1) as usize).min(total_lines);
            let end = request
                .end_line
                .map_or(total_lines, |end| end.max(0) as usize)
                .clamp(start, total_lines);
            (start, end, lines[start - 1..end].join("\n"))
        };

        Ok(SourceResponse {
            namespace,
            path: relative,
            start_line,
            end_line,
            total_lines,
            content,
        })
    }

    pub fn search_help(&self) -> SearchHelpResponse {
        SearchHelpResponse {
            help: SEARCH_SYNTAX_HELP,
        }
    }
}

/// (package, typeName) from explicit fields, falling back to `fqcn`
fn type_key(request: &GetTypeRequest) -> Result<(String, String)> {
    let package = request.package.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let type_name = request.type_name.as_deref().map(str::trim).filter(|s| !s.is_empty());

    if let (Some(package), Some(type_name)) = (package, type_name) {
        return Ok((package.to_string(), type_name.to_string()));
    }

    request
        .fqcn
        .as_deref()
        .and_then(split_qualified)
        .map(|(package, name)| (package.to_string(), name.to_string()))
        .ok_or_else(|| {
            PrismError::InvalidRequest("either package and typeName or a qualified fqcn is required".to_string())
        })
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(PrismError::InvalidRequest(format!("{} is required", field)))
    } else {
        Ok(value)
    }
}

fn parse_kind(kind: Option<&str>) -> Result<Option<TypeKind>> {
    match kind.map(str::trim).filter(|k| !k.is_empty()) {
        None => Ok(None),
        Some(k) => TypeKind::parse(k).map(Some).ok_or_else(|| {
            PrismError::InvalidRequest(format!(
                "unknown kind '{}', expected class, interface, record or enum",
                k
            ))
        }),
    }
}

/// Reject expressions the full-text engine cannot parse before they reach it
fn check_search_syntax(term: &str) -> Result<()> {
    let mut in_quotes = false;
    let mut depth = 0i32;

    for c in term.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth -= 1;
                if depth < 0 {
                    return Err(PrismError::query_syntax("unbalanced ')' in search term"));
                }
            }
            _ => {}
        }
    }

    if in_quotes {
        return Err(PrismError::query_syntax("unbalanced double quote in search term"));
    }
    if depth != 0 {
        return Err(PrismError::query_syntax("unbalanced '(' in search term"));
    }
    Ok(())
}
