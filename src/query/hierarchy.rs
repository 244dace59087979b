// Parent-chain resolution over indexed types

use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use crate::error::Result;
use crate::index::db::{IndexDatabase, TypeSummary};
use crate::index::{split_qualified, TypeKind};

/// Read access the resolver needs from a store
pub trait TypeLookup {
    fn find_type(&self, package: &str, name: &str) -> Result<Option<TypeSummary>>;
    fn find_types_named(&self, name: &str) -> Result<Vec<TypeSummary>>;
}

impl TypeLookup for IndexDatabase {
    fn find_type(&self, package: &str, name: &str) -> Result<Option<TypeSummary>> {
        IndexDatabase::find_type(self, package, name)
    }

    fn find_types_named(&self, name: &str) -> Result<Vec<TypeSummary>> {
        IndexDatabase::find_types_named(self, name)
    }
}

/// One step up the parent chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ancestor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<TypeKind>,
    /// Declared parent that could not be matched to an indexed type
    pub external: bool,
}

impl Ancestor {
    fn resolved(found: &TypeSummary) -> Self {
        Self {
            package: Some(found.package.clone()),
            type_name: found.type_name.clone(),
            kind: Some(found.kind),
            external: false,
        }
    }

    fn external(reference: &str) -> Self {
        Self {
            package: None,
            type_name: reference.to_string(),
            kind: None,
            external: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hierarchy {
    pub package: String,
    pub type_name: String,
    pub kind: TypeKind,
    /// Nearest parent first
    pub parents: Vec<Ancestor>,
    pub interfaces: Vec<String>,
}

/// Walk the declared-parent chain of `package.type_name`. `None` when the root type is not indexed.
///
/// The walk ends at a type without a parent, at a parent that cannot be resolved
/// (recorded as an external leaf) or at a type already visited.
pub fn resolve_ancestors(
    lookup: &impl TypeLookup,
    package: &str,
    type_name: &str,
) -> Result<Option<Hierarchy>> {
    let Some(root) = lookup.find_type(package, type_name)? else {
        return Ok(None);
    };

    let mut visited = HashSet::new();
    visited.insert((root.package.clone(), root.type_name.clone()));

    let mut parents = Vec::new();
    let mut current = root.clone();

    while let Some(reference) = current.parent.clone().filter(|p| !p.trim().is_empty()) {
        match resolve_parent(lookup, reference.trim(), &current.package)? {
            Some(found) => {
                if !visited.insert((found.package.clone(), found.type_name.clone())) {
                    debug!("Cycle at {}.{}, stopping walk", found.package, found.type_name);
                    break;
                }
                parents.push(Ancestor::resolved(&found));
                current = found;
            }
            None => {
                parents.push(Ancestor::external(reference.trim()));
                break;
            }
        }
    }

    Ok(Some(Hierarchy {
        package: root.package,
        type_name: root.type_name,
        kind: root.kind,
        parents,
        interfaces: root.interfaces,
    }))
}

/// Qualified references are looked up directly. Bare names try the referring
/// type's package, then accept a global match only when exactly one type has that name.
fn resolve_parent(
    lookup: &impl TypeLookup,
    reference: &str,
    current_package: &str,
) -> Result<Option<TypeSummary>> {
    if let Some((package, name)) = split_qualified(reference) {
        return lookup.find_type(package, name);
    }

    if let Some(found) = lookup.find_type(current_package, reference)? {
        return Ok(Some(found));
    }

    let mut candidates = lookup.find_types_named(reference)?;
    if candidates.len() == 1 {
        Ok(candidates.pop())
    } else {
        debug!("{} candidates for '{}', treating as external", candidates.len(), reference);
        Ok(None)
    }
}
