use anyhow::Result;

use super::emit;
use crate::config::Config;
use crate::error::PrismError;
use crate::index::split_qualified;
use crate::query::{
    GetMemberRequest, GetTypeRequest, HierarchyRequest, ListTypesRequest, QueryEngine,
    ReadSourceRequest, SearchRequest,
};

fn engine(project: &str) -> QueryEngine {
    QueryEngine::new(Config::from_project_dir(project))
}

fn split_fqcn(fqcn: &str) -> Result<(String, String), PrismError> {
    split_qualified(fqcn)
        .map(|(package, name)| (package.to_string(), name.to_string()))
        .ok_or_else(|| PrismError::InvalidRequest(format!("expected a qualified name like com.example.Foo, got '{}'", fqcn)))
}

pub struct SearchArgs {
    pub term: String,
    pub limit: Option<i64>,
    pub package: Option<String>,
    pub kind: Option<String>,
    pub dedupe: bool,
}

pub async fn search(project: String, namespace: Option<String>, args: SearchArgs, json: bool) -> Result<()> {
    let request = SearchRequest {
        term: args.term,
        namespace,
        limit: args.limit,
        package_prefix: args.package,
        kind: args.kind,
        dedupe: args.dedupe,
    };

    emit(engine(&project).search(&request), json, |response| {
        if response.results.is_empty() {
            println!("No matches for '{}' in {}", response.term, response.namespace);
            return;
        }
        println!("Found {} matches for '{}' in {}:", response.count, response.term, response.namespace);
        for hit in &response.results {
            let count = hit
                .match_count
                .map(|n| format!("  [{} matches]", n))
                .unwrap_or_default();
            println!(
                "  {}.{}.{}({}) -> {}  ({}){}",
                hit.package, hit.type_name, hit.member_name, hit.params, hit.return_type, hit.path, count
            );
        }
        if response.approximate {
            println!("\nCounts are taken from a bounded window of top matches and are approximate.");
        }
    })
}

pub async fn get_type(project: String, namespace: Option<String>, fqcn: String, json: bool) -> Result<()> {
    let request = GetTypeRequest {
        namespace,
        fqcn: Some(fqcn),
        ..Default::default()
    };

    emit(engine(&project).get_type(&request), json, |response| {
        let detail = &response.detail;
        println!("{} {}.{}", detail.kind, detail.package, detail.type_name);
        if let Some(parent) = &detail.parent {
            println!("  extends {}", parent);
        }
        if !detail.interfaces.is_empty() {
            println!("  implements {}", detail.interfaces.join(", "));
        }
        println!("  path: {}", detail.path);
        println!("\n{} methods:", detail.members.len());
        for member in &detail.members {
            let annotation = member
                .annotation
                .as_deref()
                .map(|a| format!("{} ", a))
                .unwrap_or_default();
            let modifier = if member.is_static { "static " } else { "" };
            println!("  {}{}{} {}({})", annotation, modifier, member.return_type, member.name, member.params);
        }
    })
}

pub async fn get_member(
    project: String,
    namespace: Option<String>,
    fqcn: String,
    member: String,
    json: bool,
) -> Result<()> {
    let result = split_fqcn(&fqcn).and_then(|(package, type_name)| {
        engine(&project).get_member(&GetMemberRequest {
            namespace,
            package,
            type_name,
            member_name: member,
        })
    });

    emit(result, json, |response| {
        if response.members.is_empty() {
            println!("{}.{} has no method named {}", response.package, response.type_name, response.member_name);
            return;
        }
        for member in &response.members {
            let modifier = if member.is_static { "static " } else { "" };
            println!(
                "  {}{} {}.{}({})",
                modifier, member.return_type, response.type_name, member.name, member.params
            );
        }
    })
}

pub async fn list_types(
    project: String,
    namespace: Option<String>,
    package: String,
    exact: bool,
    limit: Option<i64>,
    offset: Option<i64>,
    json: bool,
) -> Result<()> {
    let request = ListTypesRequest {
        namespace,
        package_prefix: package,
        prefix_match: !exact,
        limit,
        offset,
    };

    emit(engine(&project).list_types(&request), json, |response| {
        println!(
            "{} types under {} (offset {}, limit {}):",
            response.count, response.package_prefix, response.offset, response.limit
        );
        for summary in &response.types {
            println!("  {:<9} {}.{}", summary.kind, summary.package, summary.type_name);
        }
    })
}

pub async fn hierarchy(project: String, namespace: Option<String>, fqcn: String, json: bool) -> Result<()> {
    let result = split_fqcn(&fqcn).and_then(|(package, type_name)| {
        engine(&project).hierarchy(&HierarchyRequest {
            namespace,
            package,
            type_name,
        })
    });

    emit(result, json, |response| {
        let h = &response.hierarchy;
        println!("{} {}.{}", h.kind, h.package, h.type_name);
        for (depth, ancestor) in h.parents.iter().enumerate() {
            let indent = "  ".repeat(depth + 1);
            match (&ancestor.package, ancestor.external) {
                (Some(package), false) => println!("{}└─ {}.{}", indent, package, ancestor.type_name),
                _ => println!("{}└─ {} (external)", indent, ancestor.type_name),
            }
        }
        if !h.interfaces.is_empty() {
            println!("implements {}", h.interfaces.join(", "));
        }
    })
}

pub async fn read_source(
    project: String,
    namespace: Option<String>,
    path: String,
    start: Option<i64>,
    end: Option<i64>,
    json: bool,
) -> Result<()> {
    let request = ReadSourceRequest {
        namespace,
        path,
        start_line: start,
        end_line: end,
    };

    emit(engine(&project).read_source(&request), json, |response| {
        for (offset, line) in response.content.lines().enumerate() {
            println!("{:>6}  {}", response.start_line + offset, line);
        }
    })
}

pub async fn contexts(project: String, json: bool) -> Result<()> {
    emit(engine(&project).context_list(), json, |response| {
        println!("Default namespace: {}", response.default);
        if response.indexed.is_empty() {
            println!("No namespaces indexed yet.");
        } else {
            println!("Indexed: {}", response.indexed.join(", "));
        }
    })
}
