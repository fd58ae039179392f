//! Produces the "filtered" variant of a file: the same source with the
//! candidate's own definition taken out.

use std::ops::Range;
use std::path::Path;

use super::format::Formatter;
use super::parser::{parse_python, statements, PythonModule, UnitKind};
use super::text::{line_end, line_start};

/// Remove module-level functions and top-level-class methods named `name`.
///
/// A class left without statements is removed as well. Unparsable sources
/// are returned unchanged.
pub fn remove_definition(source: &str, name: &str, formatter: &Formatter) -> String {
    let module = match parse_python(source, Path::new("<context>")) {
        Ok(module) if !module.has_errors() => module,
        _ => {
            log::debug!("Context does not parse; keeping it whole");
            return source.to_string();
        }
    };

    let mut ranges = removal_ranges(&module, name);
    if ranges.is_empty() {
        return formatter.format(source);
    }
    ranges.sort_by_key(|r| r.start);

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for range in ranges {
        if range.start < cursor {
            continue;
        }
        out.push_str(&source[cursor..range.start]);
        cursor = range.end;
    }
    out.push_str(&source[cursor..]);
    formatter.format(&out)
}

fn whole_lines(source: &str, start: usize, end: usize) -> Range<usize> {
    line_start(source, start)..line_end(source, end.saturating_sub(1))
}

fn removal_ranges(module: &PythonModule, name: &str) -> Vec<Range<usize>> {
    let source = module.source.as_str();
    let sites = module.function_sites();
    let targets: Vec<_> = sites
        .iter()
        .filter(|site| site.top_level && site.name == name)
        .collect();

    let mut ranges: Vec<Range<usize>> = targets
        .iter()
        .filter(|site| site.kind == UnitKind::Function)
        .map(|site| whole_lines(source, site.outer_start, site.end_byte))
        .collect();

    for class in statements(module.root())
        .into_iter()
        .filter_map(|stmt| match stmt.kind() {
            "class_definition" => Some((stmt, stmt)),
            "decorated_definition" => stmt
                .child_by_field_name("definition")
                .filter(|d| d.kind() == "class_definition")
                .map(|d| (stmt, d)),
            _ => None,
        })
    {
        let (outer, definition) = class;
        let Some(body) = definition.child_by_field_name("body") else {
            continue;
        };
        let members = statements(body);
        let doomed: Vec<_> = targets
            .iter()
            .filter(|site| site.kind == UnitKind::Method)
            .filter(|site| site.def_start >= body.start_byte() && site.end_byte <= body.end_byte())
            .collect();
        if doomed.is_empty() {
            continue;
        }

        if doomed.len() == members.len() {
            ranges.push(whole_lines(source, outer.start_byte(), outer.end_byte()));
        } else {
            ranges.extend(
                doomed
                    .iter()
                    .map(|site| whole_lines(source, site.outer_start, site.end_byte)),
            );
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_removes_module_function_with_decorators() {
        let source = indoc! {"
            import os

            @cache
            def target(x):
                return x


            def keep():
                return 1
        "};
        let filtered = remove_definition(source, "target", &Formatter::Builtin);
        assert_eq!(filtered, "import os\n\n\n\ndef keep():\n    return 1\n");
    }

    #[test]
    fn test_removes_method_and_keeps_class() {
        let source = indoc! {"
            class A:
                def target(self):
                    return 1

                def other(self):
                    return 2
        "};
        let filtered = remove_definition(source, "target", &Formatter::Builtin);
        assert_eq!(filtered, "class A:\n\n    def other(self):\n        return 2\n");
    }

    #[test]
    fn test_empty_class_is_removed() {
        let source = indoc! {"
            class Only:
                def target(self):
                    return 1

            x = 3
        "};
        let filtered = remove_definition(source, "target", &Formatter::Builtin);
        assert_eq!(filtered, "\nx = 3\n");
    }

    #[test]
    fn test_nested_functions_are_kept() {
        let source = "def outer():\n    def target():\n        return 1\n    return target\n";
        let filtered = remove_definition(source, "target", &Formatter::Builtin);
        assert_eq!(filtered, source);
    }

    #[test]
    fn test_unparsable_source_is_unchanged() {
        let source = "def broken(:\n";
        assert_eq!(remove_definition(source, "broken", &Formatter::Builtin), source);
    }
}
