//! Strict candidate filter.
//!
//! Keeps only functions whose behavior a test can observe: they take input,
//! return a computed value, are documented, and are not trivially short.

use std::path::Path;
use tree_sitter::Node;

use super::extractor::CodeUnit;
use super::parser::{parse_python, statements, visit_preorder, UnitKind};

const RESERVED_NAMES: [&str; 3] = ["test", "temp", "sample"];
const MIN_LINES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unparsable,
    NoArguments,
    NoReturn,
    LiteralReturn,
    NoDocstring,
    ReservedName,
    TooShort,
    DunderMethod,
    NotInClass,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Unparsable => "source does not parse",
            Self::NoArguments => "takes no arguments",
            Self::NoReturn => "has no top-level return",
            Self::LiteralReturn => "returns a literal",
            Self::NoDocstring => "has no docstring",
            Self::ReservedName => "uses a reserved name",
            Self::TooShort => "is too short",
            Self::DunderMethod => "is a dunder method",
            Self::NotInClass => "is not a method of a module-level class",
        };
        f.write_str(text)
    }
}

/// Check a candidate against the strict filter.
pub fn check_unit(unit: &CodeUnit) -> Result<(), RejectReason> {
    let module =
        parse_python(&unit.source, &unit.file_path).map_err(|_| RejectReason::Unparsable)?;
    if module.has_errors() {
        return Err(RejectReason::Unparsable);
    }

    let mut function = None;
    visit_preorder(module.root(), |node, _| {
        if function.is_none() && node.kind() == "function_definition" {
            function = Some(node);
        }
    });
    let function = function.ok_or(RejectReason::Unparsable)?;
    let source = module.source.as_str();

    if argument_count(function) == 0 {
        return Err(RejectReason::NoArguments);
    }
    let body = function
        .child_by_field_name("body")
        .ok_or(RejectReason::Unparsable)?;
    if !statements(body)
        .iter()
        .any(|stmt| stmt.kind() == "return_statement")
    {
        return Err(RejectReason::NoReturn);
    }
    if returns_literal(function, source) {
        return Err(RejectReason::LiteralReturn);
    }
    if !has_docstring(body) {
        return Err(RejectReason::NoDocstring);
    }
    if RESERVED_NAMES.contains(&unit.name.as_str()) {
        return Err(RejectReason::ReservedName);
    }
    if unit.source.lines().count() < MIN_LINES {
        return Err(RejectReason::TooShort);
    }

    if unit.kind == UnitKind::Method {
        if unit.name.starts_with("__") {
            return Err(RejectReason::DunderMethod);
        }
        if !declared_in_class(unit) {
            return Err(RejectReason::NotInClass);
        }
    }
    Ok(())
}

fn argument_count(function: Node<'_>) -> usize {
    let Some(parameters) = function.child_by_field_name("parameters") else {
        return 0;
    };
    statements(parameters)
        .iter()
        .filter(|p| !matches!(p.kind(), "keyword_separator" | "positional_separator"))
        .count()
}

fn is_constant(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "integer" | "float" | "string" | "concatenated_string" | "true" | "false" | "none" | "ellipsis"
    )
}

fn is_literal(node: Node<'_>, source: &str) -> bool {
    if is_constant(node) {
        return true;
    }
    if node.kind() != "binary_operator" {
        return false;
    }
    let operator = node
        .child_by_field_name("operator")
        .and_then(|op| source.get(op.start_byte()..op.end_byte()));
    match (
        operator,
        node.child_by_field_name("left"),
        node.child_by_field_name("right"),
    ) {
        (Some("+"), Some(left), Some(right)) => is_constant(left) && is_constant(right),
        _ => false,
    }
}

fn returns_literal(function: Node<'_>, source: &str) -> bool {
    let mut found = false;
    visit_preorder(function, |node, _| {
        if found || node.kind() != "return_statement" {
            return;
        }
        if let Some(value) = statements(node).first() {
            found = is_literal(*value, source);
        }
    });
    found
}

fn has_docstring(body: Node<'_>) -> bool {
    statements(body).first().is_some_and(|first| {
        first.kind() == "expression_statement"
            && statements(*first)
                .first()
                .is_some_and(|expr| matches!(expr.kind(), "string" | "concatenated_string"))
    })
}

fn declared_in_class(unit: &CodeUnit) -> bool {
    unit.context.iter().any(|file| {
        parse_python(&file.code, Path::new(&file.name))
            .map(|module| {
                module
                    .function_sites()
                    .iter()
                    .any(|site| site.kind == UnitKind::Method && site.top_level && site.name == unit.name)
            })
            .unwrap_or(false)
    })
}
