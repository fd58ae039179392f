//! Tree-sitter parser integration for Python.
//!
//! Parsing never recurses on the host stack: nodes are visited with a
//! `TreeCursor`, and nodes nested deeper than [`MAX_NESTING_DEPTH`] are
//! skipped with a warning instead of aborting the file.

use tree_sitter::{Node, Parser, Tree};

use crate::errors::{Error, Result};
use std::path::Path;

pub const MAX_NESTING_DEPTH: usize = 256;

/// A parsed Python source file.
pub struct PythonModule {
    pub tree: Tree,
    pub source: String,
}

impl PythonModule {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// True when the source contains a syntax or indentation error.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Every function definition in pre-order, outermost first.
    pub fn function_sites(&self) -> Vec<FunctionSite> {
        let mut sites = Vec::new();
        visit_preorder(self.root(), |node, depth| {
            if node.kind() != "function_definition" {
                return;
            }
            if depth > MAX_NESTING_DEPTH {
                log::warn!(
                    "Skipping function at line {}: nesting depth {} exceeds {}",
                    node_line(&node),
                    depth,
                    MAX_NESTING_DEPTH
                );
                return;
            }
            match FunctionSite::from_node(node, &self.source) {
                Some(site) => sites.push(site),
                None => log::warn!(
                    "Skipping malformed function definition at line {}",
                    node_line(&node)
                ),
            }
        });
        sites
    }
}

/// Parse Python source code into a tree-sitter tree
pub fn parse_python(content: &str, path: &Path) -> Result<PythonModule> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| Error::parse(path, format!("Failed to set Python language: {}", e)))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| Error::parse(path, "Failed to parse source code"))?;

    Ok(PythonModule {
        tree,
        source: content.to_string(),
    })
}

/// Whether a function is a free function or a method of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Function,
    Method,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Method => write!(f, "method"),
        }
    }
}

/// Location facts about one `def`, detached from the tree's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSite {
    pub name: String,
    pub kind: UnitKind,
    pub class_name: Option<String>,
    /// Byte offset of the `def` (or `async`) keyword
    pub def_start: usize,
    /// Byte offset of the first decorator, or `def_start`
    pub outer_start: usize,
    pub end_byte: usize,
    /// Module-level function, or a method directly inside a module-level class
    pub top_level: bool,
}

impl FunctionSite {
    fn from_node(node: Node<'_>, source: &str) -> Option<Self> {
        let name = node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source.as_bytes()).ok())?
            .to_string();

        let outer = match node.parent() {
            Some(parent) if parent.kind() == "decorated_definition" => parent,
            _ => node,
        };

        let enclosing_class = outer
            .parent()
            .filter(|p| p.kind() == "block")
            .and_then(|block| block.parent())
            .filter(|p| p.kind() == "class_definition");

        let class_name = enclosing_class.and_then(|class| {
            class
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source.as_bytes()).ok())
                .map(str::to_string)
        });

        let top_level = match enclosing_class {
            Some(class) => is_module_level(class),
            None => outer.parent().is_some_and(|p| p.kind() == "module"),
        };

        Some(Self {
            name,
            kind: if enclosing_class.is_some() {
                UnitKind::Method
            } else {
                UnitKind::Function
            },
            class_name,
            def_start: node.start_byte(),
            outer_start: outer.start_byte(),
            end_byte: node.end_byte(),
            top_level,
        })
    }
}

/// True when a definition (possibly decorated) sits directly in the module.
pub fn is_module_level(node: Node<'_>) -> bool {
    let outer = match node.parent() {
        Some(parent) if parent.kind() == "decorated_definition" => parent,
        _ => node,
    };
    outer.parent().is_some_and(|p| p.kind() == "module")
}

/// Visit nodes in pre-order without recursion; the callback receives depth.
pub fn visit_preorder<'t>(root: Node<'t>, mut visit: impl FnMut(Node<'t>, usize)) {
    let mut cursor = root.walk();
    let mut depth = 0usize;
    loop {
        visit(cursor.node(), depth);
        if cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
            depth -= 1;
        }
    }
}

/// Get text for a tree-sitter node
pub fn node_text<'a>(node: &Node<'_>, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Get the line number for a tree-sitter node (1-indexed)
pub fn node_line(node: &Node<'_>) -> usize {
    node.start_position().row + 1
}

/// Named children, skipping comments
pub fn statements<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse(source: &str) -> PythonModule {
        parse_python(source, Path::new("sample.py")).unwrap()
    }

    #[test]
    fn test_function_and_method_sites() {
        let module = parse(indoc! {r#"
            def top(a):
                def inner():
                    pass
                return a

            class Shape:
                @property
                def area(self):
                    return 1
        "#});

        let sites = module.function_sites();
        let names: Vec<_> = sites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["top", "inner", "area"]);

        assert_eq!(sites[0].kind, UnitKind::Function);
        assert!(sites[0].top_level);
        assert_eq!(sites[1].kind, UnitKind::Function);
        assert!(!sites[1].top_level);
        assert_eq!(sites[2].kind, UnitKind::Method);
        assert_eq!(sites[2].class_name.as_deref(), Some("Shape"));
        assert!(sites[2].top_level);
        assert!(sites[2].outer_start < sites[2].def_start);
    }

    #[test]
    fn test_syntax_errors_are_detected() {
        assert!(parse("def broken(:\n    pass\n").has_errors());
        assert!(!parse("x = 1\n").has_errors());
    }

    #[test]
    fn test_async_functions_are_sites() {
        let module = parse("async def fetch(url):\n    return url\n");
        let sites = module.function_sites();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].name, "fetch");
    }
}
