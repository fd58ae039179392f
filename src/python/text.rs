//! Line-oriented helpers for Python source text.

/// A line consisting only of whitespace.
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Width of the leading whitespace, counting a tab as one column.
pub fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

/// Byte offset of the start of the line containing `byte`.
pub fn line_start(source: &str, byte: usize) -> usize {
    source[..byte.min(source.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Byte offset just past the newline ending the line containing `byte`.
pub fn line_end(source: &str, byte: usize) -> usize {
    let byte = byte.min(source.len());
    source[byte..]
        .find('\n')
        .map(|i| byte + i + 1)
        .unwrap_or(source.len())
}

/// Remove the whitespace prefix common to every non-blank line.
pub fn dedent(text: &str) -> String {
    let prefix = text
        .lines()
        .filter(|line| !is_blank(line))
        .map(|line| &line[..indent_width(line)])
        .reduce(common_prefix)
        .unwrap_or("");

    if prefix.is_empty() {
        return text.to_string();
    }

    text.split('\n')
        .map(|line| line.strip_prefix(prefix).unwrap_or(line.trim_start_matches([' ', '\t'])))
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_prefix<'a>(a: &'a str, b: &'a str) -> &'a str {
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedent_method_body() {
        let text = "    def f(self):\n        return 1\n";
        assert_eq!(dedent(text), "def f(self):\n    return 1\n");
    }

    #[test]
    fn test_dedent_keeps_blank_lines() {
        let text = "  a\n\n    b";
        assert_eq!(dedent(text), "a\n\n  b");
    }

    #[test]
    fn test_dedent_without_common_prefix_is_identity() {
        let text = "a\n  b\n";
        assert_eq!(dedent(text), text);
    }

    #[test]
    fn test_line_bounds() {
        let source = "ab\ncd\nef";
        assert_eq!(line_start(source, 4), 3);
        assert_eq!(line_end(source, 4), 6);
        assert_eq!(line_end(source, 7), source.len());
    }

    #[test]
    fn test_indent_width() {
        assert_eq!(indent_width("    x"), 4);
        assert_eq!(indent_width("\tx"), 1);
        assert_eq!(indent_width("x"), 0);
    }
}
