// Index storage, schema and the records flowing into it

pub mod db;
pub mod schema;

use serde::{Deserialize, Serialize};

/// Kind of an indexed type declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
    Record,
    Enum,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Record => "record",
            TypeKind::Enum => "enum",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "class" => Some(TypeKind::Class),
            "interface" => Some(TypeKind::Interface),
            "record" => Some(TypeKind::Record),
            "enum" => Some(TypeKind::Enum),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A public method signature as extracted from source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub name: String,
    pub return_type: String,
    /// Raw parameter list between the parentheses, trimmed
    pub params: String,
    pub is_static: bool,
    pub annotation: Option<String>,
}

/// A type declaration together with the members scoped to its body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRecord {
    pub package: String,
    pub name: String,
    pub kind: TypeKind,
    /// Source path relative to the namespace root, `/`-separated
    pub path: String,
    /// Declared parent with generics stripped; may be unqualified
    pub parent: Option<String>,
    /// Declared interfaces with generics stripped
    pub interfaces: Vec<String>,
    pub members: Vec<MemberRecord>,
}

impl TypeRecord {
    pub fn qualified_name(&self) -> String {
        qualify(&self.package, &self.name)
    }
}

/// Join a package and simple name into a fully qualified name
pub fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}

/// Split `pkg.Name` on its last dot. Returns `None` for unqualified names.
pub fn split_qualified(fqcn: &str) -> Option<(&str, &str)> {
    let fqcn = fqcn.trim();
    let idx = fqcn.rfind('.')?;
    let (package, name) = (&fqcn[..idx], &fqcn[idx + 1..]);
    if package.is_empty() || name.is_empty() {
        None
    } else {
        Some((package, name))
    }
}

/// Turns one source file into zero or more type records
pub trait SourceExtractor {
    fn can_parse(&self, relative_path: &str) -> bool;
    fn extract(&self, content: &str, relative_path: &str) -> Vec<TypeRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_through_text() {
        for kind in [TypeKind::Class, TypeKind::Interface, TypeKind::Record, TypeKind::Enum] {
            assert_eq!(TypeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TypeKind::parse(" Interface "), Some(TypeKind::Interface));
        assert_eq!(TypeKind::parse("annotation"), None);
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("com.example.Foo"), Some(("com.example", "Foo")));
        assert_eq!(split_qualified("Foo"), None);
        assert_eq!(split_qualified(".Foo"), None);
        assert_eq!(split_qualified("com.example."), None);
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("a.b", "Foo"), "a.b.Foo");
        assert_eq!(qualify("", "Foo"), "Foo");
    }
}
