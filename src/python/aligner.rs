//! Splices a function into a file at the indentation of its existing definition.
//!
//! The existing definition is located textually: the first line containing
//! `def <name>(` fixes the indentation `N`, the header runs until its
//! brackets close, and the body is every following line that is blank or
//! indented deeper than `N`. Trailing blank lines of that run stay with the
//! surrounding file. Everything outside the replaced span is kept verbatim.

use regex::Regex;
use std::path::Path;

use super::format::Formatter;
use super::parser::parse_python;
use super::text::{indent_width, is_blank};

/// Name of the first function defined in `candidate`.
pub fn candidate_name(candidate: &str) -> Option<String> {
    let module = parse_python(candidate, Path::new("<candidate>")).ok()?;
    if module.has_errors() {
        return None;
    }
    module.function_sites().into_iter().next().map(|site| site.name)
}

/// Replace the definition of the candidate's function inside `context`.
///
/// Returns the formatted context unchanged when the function cannot be found.
pub fn align(candidate: &str, context: &str, formatter: &Formatter) -> String {
    let Some(name) = candidate_name(candidate) else {
        log::warn!("Candidate does not define a parsable function; context left unchanged");
        return context.to_string();
    };
    match splice(&name, candidate, context) {
        Some(spliced) => formatter.format(&spliced),
        None => {
            log::warn!("Function {} not found in context; context left unchanged", name);
            context.to_string()
        }
    }
}

/// Textual splice without formatting; `None` when `name` is not defined.
pub fn splice(name: &str, candidate: &str, context: &str) -> Option<String> {
    let def_line = Regex::new(&format!(r"^\s*(async\s+)?def\s+{}\s*\(", regex::escape(name))).ok()?;
    let lines: Vec<&str> = context.split('\n').collect();

    let start = lines.iter().position(|line| def_line.is_match(line))?;
    let indent = &lines[start][..indent_width(lines[start])];
    let body_start = header_end(&lines, start) + 1;

    let mut end = body_start;
    while end < lines.len() && (is_blank(lines[end]) || indent_width(lines[end]) > indent.len()) {
        end += 1;
    }
    while end > body_start && is_blank(lines[end - 1]) {
        end -= 1;
    }

    let replacement = candidate
        .trim_end_matches(['\n', '\r'])
        .split('\n')
        .map(|line| {
            if is_blank(line) {
                String::new()
            } else {
                format!("{}{}", indent, line)
            }
        });

    let spliced: Vec<String> = lines[..start]
        .iter()
        .map(|l| l.to_string())
        .chain(replacement)
        .chain(lines[end..].iter().map(|l| l.to_string()))
        .collect();
    Some(spliced.join("\n"))
}

/// Index of the line on which the `def` header starting at `start` closes.
fn header_end(lines: &[&str], start: usize) -> usize {
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    for (index, line) in lines.iter().enumerate().skip(start) {
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match (quote, c) {
                (Some(_), '\\') => {
                    chars.next();
                }
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '#') => break,
                (None, '(' | '[' | '{') => depth += 1,
                (None, ')' | ']' | '}') => depth -= 1,
                _ => {}
            }
        }
        // Single-quoted strings never span lines
        quote = None;
        if depth <= 0 {
            return index;
        }
    }
    start
}
