// Regex-driven Java declaration scanner

use once_cell::sync::Lazy;
use regex::Regex;

use crate::index::{MemberRecord, SourceExtractor, TypeKind, TypeRecord};

static PACKAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bpackage\s+([\w.]+)\s*;").expect("valid package regex"));

static DECLARATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(class|interface|record|enum)\s+([A-Za-z_$][\w$]*)")
        .expect("valid declaration regex")
});

/// `new Type(` or `new Type<...>(`; an anonymous class follows when the call is followed by `{`
static INSTANTIATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bnew\s+[\w.$]+\s*(?:<[^(){};]*>)?\s*\(").expect("valid instantiation regex")
});

static PUBLIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bpublic\b").expect("valid modifier regex"));

/// annotation? public modifiers* typeParams? returnType name ( params )
static METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:(@[\w.]+)(?:\s*\([^)]*\))?\s+)?\bpublic\s+((?:(?:static|abstract|final|synchronized|native|default|strictfp)\s+)*)(?:<[^{};()]*?>\s+)?([\w.$]+(?:\s*<[^(){};=]*>)?(?:\s*\[\s*\])*)\s+([A-Za-z_$][\w$]*)\s*\(([^)]*)\)",
    )
    .expect("valid method regex")
});

/// Tokens that can precede an identifier and `(` without being a return type
const NON_TYPE_KEYWORDS: &[&str] = &[
    "class", "interface", "enum", "record", "new", "return", "throw", "else",
];

/// Java source extractor
pub struct JavaExtractor;

/// A type declaration located in the masked text
#[derive(Debug)]
struct Declaration {
    kind: TypeKind,
    name: String,
    public: bool,
    /// Offset of the declaration keyword
    start: usize,
    header: String,
    /// First byte after the opening brace
    body_start: usize,
    /// Offset of the matching closing brace, or end of text when unbalanced
    body_end: usize,
}

impl JavaExtractor {
    pub fn new() -> Self {
        Self
    }

    fn find_declarations(&self, masked: &str) -> Vec<Declaration> {
        let bytes = masked.as_bytes();
        let mut declarations = Vec::new();

        for caps in DECLARATION_RE.captures_iter(masked) {
            let (Some(keyword), Some(name)) = (caps.get(1), caps.get(2)) else {
                continue;
            };

            // `@interface` declares an annotation, `Foo.class` is a literal
            if keyword.start() > 0 && matches!(bytes[keyword.start() - 1], b'@' | b'.') {
                continue;
            }

            let Some(open) = header_end(bytes, name.end()) else {
                continue;
            };
            let Some(kind) = TypeKind::parse(keyword.as_str()) else {
                continue;
            };

            let statement_start = masked[..keyword.start()]
                .rfind(|c: char| matches!(c, ';' | '{' | '}'))
                .map_or(0, |i| i + 1);

            declarations.push(Declaration {
                kind,
                name: name.as_str().to_string(),
                public: PUBLIC_RE.is_match(&masked[statement_start..keyword.start()]),
                start: keyword.start(),
                header: masked[name.end()..open].to_string(),
                body_start: open + 1,
                body_end: matching_brace(bytes, open).unwrap_or(bytes.len()),
            });
        }

        declarations
    }

    /// Spans of anonymous class instantiations, from `new` through the closing brace
    fn anonymous_bodies(&self, masked: &str) -> Vec<(usize, usize)> {
        let bytes = masked.as_bytes();
        INSTANTIATION_RE
            .find_iter(masked)
            .filter_map(|m| {
                let close = matching_paren(bytes, m.end() - 1)?;
                let open = close + 1 + bytes[close + 1..].iter().take_while(|b| b.is_ascii_whitespace()).count();
                if bytes.get(open) != Some(&b'{') {
                    return None;
                }
                Some((m.start(), matching_brace(bytes, open).map_or(bytes.len(), |end| end + 1)))
            })
            .collect()
    }

    /// Member search ranges of `decl`: its body minus the full extent of every
    /// nested declaration and anonymous class body
    fn member_segments(decl: &Declaration, all: &[Declaration], anonymous: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let mut holes: Vec<(usize, usize)> = all
            .iter()
            .map(|other| (other.start, other.body_end + 1))
            .chain(anonymous.iter().copied())
            .filter(|&(start, _)| start > decl.body_start && start < decl.body_end)
            .map(|(start, end)| (start, end.min(decl.body_end)))
            .collect();
        holes.sort_unstable();

        let mut segments = Vec::new();
        let mut cursor = decl.body_start;
        for (start, end) in holes {
            if start > cursor {
                segments.push((cursor, start));
            }
            cursor = cursor.max(end);
        }
        if cursor < decl.body_end {
            segments.push((cursor, decl.body_end));
        }
        segments
    }

    fn extract_members(
        &self,
        content: &str,
        masked: &str,
        type_name: &str,
        segments: &[(usize, usize)],
    ) -> Vec<MemberRecord> {
        let mut members = Vec::new();

        for &(start, end) in segments {
            for caps in METHOD_RE.captures_iter(&masked[start..end]) {
                let (Some(return_type), Some(name), Some(params)) = (caps.get(3), caps.get(4), caps.get(5))
                else {
                    continue;
                };

                let return_type = return_type.as_str().trim();
                if NON_TYPE_KEYWORDS.contains(&return_type) || name.as_str() == type_name {
                    continue;
                }

                // Literals are blanked in the masked text, so take params from the original
                let params = content
                    .get(start + params.start()..start + params.end())
                    .unwrap_or(params.as_str())
                    .trim();

                members.push(MemberRecord {
                    name: name.as_str().to_string(),
                    return_type: return_type.to_string(),
                    params: params.to_string(),
                    is_static: caps
                        .get(2)
                        .is_some_and(|m| m.as_str().split_whitespace().any(|w| w == "static")),
                    annotation: caps.get(1).map(|m| m.as_str().trim().to_string()),
                });
            }
        }

        members
    }
}

impl Default for JavaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for JavaExtractor {
    fn can_parse(&self, relative_path: &str) -> bool {
        std::path::Path::new(relative_path)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("java"))
    }

    fn extract(&self, content: &str, relative_path: &str) -> Vec<TypeRecord> {
        let masked = mask_non_code(content);

        let Some(package) = PACKAGE_RE.captures(&masked).and_then(|c| c.get(1)) else {
            return Vec::new();
        };
        let package = package.as_str().to_string();

        let declarations = self.find_declarations(&masked);
        let anonymous = self.anonymous_bodies(&masked);

        declarations
            .iter()
            .filter(|decl| decl.public)
            .map(|decl| {
                let (parent, interfaces) = parse_header(&decl.header, decl.kind);
                let segments = Self::member_segments(decl, &declarations, &anonymous);
                TypeRecord {
                    package: package.clone(),
                    name: decl.name.clone(),
                    kind: decl.kind,
                    path: relative_path.to_string(),
                    parent,
                    interfaces,
                    members: self.extract_members(content, &masked, &decl.name, &segments),
                }
            })
            .collect()
    }
}

/// Copy of `content` with comments and the insides of string, char and text-block
/// literals replaced by spaces. Byte offsets and newlines are preserved.
fn mask_non_code(content: &str) -> String {
    let bytes = content.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = find(bytes, i, b"\n").unwrap_or(bytes.len());
                blank(&mut out, i, end);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = find(bytes, i + 2, b"*/").map_or(bytes.len(), |e| e + 2);
                blank(&mut out, i, end);
                i = end;
            }
            b'"' if bytes[i..].starts_with(b"\"\"\"") => match find(bytes, i + 3, b"\"\"\"") {
                Some(close) => {
                    blank(&mut out, i + 3, close);
                    i = close + 3;
                }
                None => {
                    blank(&mut out, i + 3, bytes.len());
                    i = bytes.len();
                }
            },
            quote @ (b'"' | b'\'') => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != quote && bytes[j] != b'\n' {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                let end = j.min(bytes.len());
                blank(&mut out, i + 1, end);
                i = end + 1;
            }
            _ => i += 1,
        }
    }

    String::from_utf8(out).unwrap_or_else(|_| content.to_string())
}

fn blank(out: &mut [u8], from: usize, to: usize) {
    for b in &mut out[from..to] {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Offset of the `{` opening a declaration body. Hitting `;` or `}` first
/// (outside parentheses) means the keyword did not start a declaration.
fn header_end(masked: &[u8], from: usize) -> Option<usize> {
    let mut parens = 0usize;
    for (i, &b) in masked.iter().enumerate().skip(from) {
        match b {
            b'(' => parens += 1,
            b')' => parens = parens.saturating_sub(1),
            b'{' if parens == 0 => return Some(i),
            b';' | b'}' if parens == 0 => return None,
            _ => {}
        }
    }
    None
}

fn matching_brace(masked: &[u8], open: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (i, &b) in masked.iter().enumerate().skip(open + 1) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn matching_paren(masked: &[u8], open: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (i, &b) in masked.iter().enumerate().skip(open + 1) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove balanced `open ... close` groups, nested ones included
fn strip_balanced(text: &str, open: char, close: char) -> String {
    let mut depth = 0usize;
    text.chars()
        .filter(|&c| {
            if c == open {
                depth += 1;
                false
            } else if c == close && depth > 0 {
                depth -= 1;
                false
            } else {
                depth == 0
            }
        })
        .collect()
}

/// Parent and interfaces from the text between the type name and its body
fn parse_header(header: &str, kind: TypeKind) -> (Option<String>, Vec<String>) {
    enum Clause {
        None,
        Extends,
        Implements,
        Permits,
    }

    let stripped = strip_balanced(&strip_balanced(header, '<', '>'), '(', ')');

    let mut clause = Clause::None;
    let mut extends = Vec::new();
    let mut implements = Vec::new();

    for token in stripped
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        match token {
            "extends" => clause = Clause::Extends,
            "implements" => clause = Clause::Implements,
            "permits" => clause = Clause::Permits,
            t if t.starts_with('@') => {}
            t => match clause {
                Clause::Extends => extends.push(t.to_string()),
                Clause::Implements => implements.push(t.to_string()),
                Clause::None | Clause::Permits => {}
            },
        }
    }

    match kind {
        // An interface's `extends` list names super-interfaces, not a parent class
        TypeKind::Interface => {
            extends.extend(implements);
            (None, extends)
        }
        _ => (extends.into_iter().next(), implements),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn extract(source: &str) -> Vec<TypeRecord> {
        JavaExtractor::new().extract(source, "a/b/Foo.java")
    }

    fn member_names(record: &TypeRecord) -> Vec<&str> {
        record.members.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn test_simple_class_excludes_constructor() {
        let types = extract("package a.b; public class Foo extends Bar { public int baz(){} public Foo(){} }");

        assert_eq!(types.len(), 1);
        let foo = &types[0];
        assert_eq!(foo.package, "a.b");
        assert_eq!(foo.name, "Foo");
        assert_eq!(foo.kind, TypeKind::Class);
        assert_eq!(foo.parent.as_deref(), Some("Bar"));
        assert_eq!(foo.path, "a/b/Foo.java");
        assert_eq!(
            foo.members,
            vec![MemberRecord {
                name: "baz".to_string(),
                return_type: "int".to_string(),
                params: String::new(),
                is_static: false,
                annotation: None,
            }]
        );
    }

    #[test]
    fn test_no_package_yields_nothing() {
        assert!(extract("public class Foo { public void run() {} }").is_empty());
    }

    #[test]
    fn test_two_top_level_types_do_not_leak() {
        let source = r#"
package com.example;

public class First {
    public void alpha() {}
    public void beta(int x) {}
}

public interface Second {
    public String gamma();
}
"#;
        let types = extract(source);
        assert_eq!(types.len(), 2);
        assert_eq!(member_names(&types[0]), vec!["alpha", "beta"]);
        assert_eq!(member_names(&types[1]), vec!["gamma"]);
    }

    #[test]
    fn test_nested_type_members_stay_with_nested_type() {
        let source = r#"
package com.example;

public class Outer {
    public void before() {}

    public static class Inner {
        public int inside() { return 1; }
    }

    private class Hidden {
        public void secret() {}
    }

    public void after() {}
}
"#;
        let types = extract(source);
        let names: Vec<_> = types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Outer", "Inner"]);

        assert_eq!(member_names(&types[0]), vec!["before", "after"]);
        assert_eq!(member_names(&types[1]), vec!["inside"]);
    }

    #[test]
    fn test_unbalanced_braces_scan_to_end_of_file() {
        let source = r#"
package com.example;

public class Broken {
    public void one() {
        if (x) {
    }
    public void two() {}
"#;
        let types = extract(source);
        assert_eq!(types.len(), 1);
        assert_eq!(member_names(&types[0]), vec!["one", "two"]);
    }

    #[test]
    fn test_braces_in_literals_and_comments_are_ignored() {
        let source = r#"
package com.example;

public class Tricky {
    // closing brace in a comment }
    public String open() { return "{"; }
    /* public void commented() {} } */
    public char close() { return '}'; }
}

public class After {
    public void tail() {}
}
"#;
        let types = extract(source);
        assert_eq!(member_names(&types[0]), vec!["open", "close"]);
        assert_eq!(member_names(&types[1]), vec!["tail"]);
    }

    #[test]
    fn test_generics_are_stripped_from_parent_and_interfaces() {
        let source = "package p;\npublic abstract class Repo<T extends Entity<T>> extends Base<Map<String, T>> implements Iterable<T>, java.io.Serializable {\n}\n";
        let types = extract(source);
        assert_eq!(types[0].parent.as_deref(), Some("Base"));
        assert_eq!(types[0].interfaces, vec!["Iterable", "java.io.Serializable"]);
    }

    #[test]
    fn test_interface_extends_are_interfaces() {
        let types = extract("package p;\npublic interface Handler extends Listener<Event>, AutoCloseable {\n}\n");
        assert_eq!(types[0].kind, TypeKind::Interface);
        assert_eq!(types[0].parent, None);
        assert_eq!(types[0].interfaces, vec!["Listener", "AutoCloseable"]);
    }

    #[test]
    fn test_record_and_enum() {
        let source = r#"
package p;

public record Point(int x, int y) implements Shape {
    public double length() { return 0; }
}

public enum Color implements Named {
    RED, GREEN;
    public static Color parse(String s) { return RED; }
}
"#;
        let types = extract(source);
        assert_eq!(types[0].kind, TypeKind::Record);
        assert_eq!(types[0].interfaces, vec!["Shape"]);
        assert_eq!(member_names(&types[0]), vec!["length"]);

        assert_eq!(types[1].kind, TypeKind::Enum);
        assert_eq!(types[1].members[0].name, "parse");
        assert!(types[1].members[0].is_static);
        assert_eq!(types[1].members[0].params, "String s");
    }

    #[test]
    fn test_member_signature_details() {
        let source = r#"
package p;

public final class Api {
    @Override
    public String toString() { return ""; }

    @Deprecated
    public static synchronized <T extends Comparable<T>> List<T> sort(List<T> items, boolean desc) { return items; }

    public int[] values() { return null; }

    public final Map<String, List<Foo>> index() { return null; }

    protected void notPublic() {}
}
"#;
        let types = extract(source);
        let members = &types[0].members;
        assert_eq!(member_names(&types[0]), vec!["toString", "sort", "values", "index"]);

        assert_eq!(members[0].annotation.as_deref(), Some("@Override"));
        assert_eq!(members[0].return_type, "String");

        assert_eq!(members[1].annotation.as_deref(), Some("@Deprecated"));
        assert!(members[1].is_static);
        assert_eq!(members[1].return_type, "List<T>");
        assert_eq!(members[1].params, "List<T> items, boolean desc");

        assert_eq!(members[2].return_type, "int[]");
        assert_eq!(members[3].return_type, "Map<String, List<Foo>>");
        assert!(!members[3].is_static);
    }

    #[test]
    fn test_anonymous_class_methods_stay_out() {
        let source = r#"
package p;

public class Outer {
    public void start() {
        Runnable r = new Runnable() {
            public void run() {}
        };
        new Thread(r).start();
    }

    public Comparator<String> order() {
        return new java.util.Comparator<String>() {
            public int compare(String a, String b) { return 0; }
        };
    }

    public void stop() {}
}
"#;
        let types = extract(source);
        assert_eq!(types.len(), 1);
        assert_eq!(member_names(&types[0]), vec!["start", "order", "stop"]);
    }

    #[test]
    fn test_overloads_produce_multiple_members() {
        let types = extract("package p;\npublic class O {\n public void go() {}\n public void go(int n) {}\n}\n");
        assert_eq!(member_names(&types[0]), vec!["go", "go"]);
    }

    #[test]
    fn test_annotation_declarations_and_class_literals_are_skipped() {
        let source = r#"
package p;

public @interface Marker {
    String value();
}

public class Uses {
    public Class<?> kind() { return Uses.class; }
}
"#;
        let types = extract(source);
        let names: Vec<_> = types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Uses"]);
        assert_eq!(member_names(&types[0]), vec!["kind"]);
    }

    #[test]
    fn test_can_parse() {
        let extractor = JavaExtractor::new();
        assert!(extractor.can_parse("a/B.java"));
        assert!(!extractor.can_parse("a/B.class"));
    }

    proptest! {
        #[test]
        fn prop_members_scoped_to_their_type(
            first in prop::collection::vec("m[a-z0-9]{0,8}", 0..12),
            second in prop::collection::vec("m[a-z0-9]{0,8}", 0..12),
        ) {
            let method = |name: &String| format!("    public void {}(int a) {{ if (a > 0) {{ a--; }} }}\n", name);
            let source = format!(
                "package gen;\n\npublic class Alpha {{\n{}    public Alpha() {{}}\n}}\n\npublic class Beta {{\n{}}}\n",
                first.iter().map(method).collect::<String>(),
                second.iter().map(method).collect::<String>(),
            );

            let types = extract(&source);
            prop_assert_eq!(types.len(), 2);
            prop_assert_eq!(member_names(&types[0]), first.iter().map(String::as_str).collect::<Vec<_>>());
            prop_assert_eq!(member_names(&types[1]), second.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}
