//! Best-effort source formatting.
//!
//! Every piece of code that is compared or written back passes through the
//! same [`Formatter`], so comparisons are not thrown off by whitespace.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::config::FormatterConfig;
use crate::python::parser::{parse_python, visit_preorder};
use crate::sandbox::process::run_with_timeout;

const EXTERNAL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Formatter {
    /// Whitespace normalization only
    #[default]
    Builtin,
    /// A program reading source on stdin and writing it to stdout
    External { program: String, args: Vec<String> },
}

impl Formatter {
    pub fn from_config(config: &FormatterConfig) -> Self {
        match config.command.as_deref() {
            Some([program, args @ ..]) => Self::External {
                program: program.clone(),
                args: args.to_vec(),
            },
            _ => Self::Builtin,
        }
    }

    /// Format `code`; on any failure the input is returned unchanged.
    pub fn format(&self, code: &str) -> String {
        match self {
            Self::Builtin => normalize_whitespace(code),
            Self::External { program, args } => match run_external(program, args, code) {
                Ok(formatted) => formatted,
                Err(e) => {
                    log::debug!("Formatter {} failed: {}; keeping input", program, e);
                    code.to_string()
                }
            },
        }
    }
}

fn run_external(program: &str, args: &[String], code: &str) -> crate::errors::Result<String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = run_with_timeout(&mut command, Some(EXTERNAL_TIMEOUT), Some(code))?;

    match output.exit_code {
        Some(0) if !output.timed_out => Ok(output.stdout),
        _ => Err(crate::errors::Error::External(anyhow::anyhow!(
            "exit status {:?}: {}",
            output.exit_code,
            output.stderr.trim()
        ))),
    }
}

/// How much of a line may be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineScope {
    /// The line starts inside a multiline string and ends there too
    Verbatim,
    /// The line starts inside a string that closes on it
    TrailingOnly,
}

/// Rows covered by multiline string literals, keyed by 0-based row.
fn string_rows(code: &str) -> HashMap<usize, LineScope> {
    let mut rows = HashMap::new();
    let Ok(module) = parse_python(code, Path::new("<format>")) else {
        return rows;
    };
    visit_preorder(module.root(), |node, _| {
        if node.kind() != "string" {
            return;
        }
        let (start, end) = (node.start_position().row, node.end_position().row);
        if end > start {
            rows.extend((start + 1..end).map(|row| (row, LineScope::Verbatim)));
            rows.insert(end, LineScope::TrailingOnly);
        }
    });
    rows
}

/// Expand leading tabs, strip trailing whitespace, end with one newline.
///
/// Lines inside multiline string literals keep their content.
pub fn normalize_whitespace(code: &str) -> String {
    let strings = string_rows(code);
    let mut lines: Vec<String> = code
        .lines()
        .enumerate()
        .map(|(row, line)| match strings.get(&row) {
            Some(LineScope::Verbatim) => line.to_string(),
            Some(LineScope::TrailingOnly) => line.trim_end().to_string(),
            None => {
                let body = line.trim_start_matches([' ', '\t']);
                let indent: String = line[..line.len() - body.len()]
                    .chars()
                    .map(|c| if c == '\t' { "    " } else { " " })
                    .collect();
                format!("{}{}", indent, body).trim_end().to_string()
            }
        })
        .collect();

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return String::new();
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        let code = "def f(x):\t\n\treturn x   \n\n\n";
        assert_eq!(normalize_whitespace(code), "def f(x):\n    return x\n");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_whitespace("class A:\n  def b(self):\n    pass\n");
        assert_eq!(normalize_whitespace(&once), once);
    }

    #[test]
    fn test_multiline_string_contents_are_kept() {
        let code = "def f():\n    doc = \"\"\"\n\tkeep tab   \n  \n\"\"\"   \n    return doc\t\n";
        assert_eq!(
            normalize_whitespace(code),
            "def f():\n    doc = \"\"\"\n\tkeep tab   \n  \n\"\"\"\n    return doc\n"
        );
    }

    #[test]
    fn test_single_line_strings_do_not_shield_the_line() {
        let code = "def f():\n\treturn \"a  \"   \n";
        assert_eq!(normalize_whitespace(code), "def f():\n    return \"a  \"\n");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize_whitespace("\n\n"), "");
    }

    #[test]
    fn test_missing_external_formatter_keeps_input() {
        let formatter = Formatter::External {
            program: "definitely-not-a-formatter-binary".into(),
            args: vec![],
        };
        assert_eq!(formatter.format("x  =  1"), "x  =  1");
    }

    #[test]
    fn test_from_config() {
        let config = FormatterConfig {
            command: Some(vec!["autopep8".into(), "-".into()]),
        };
        assert_eq!(
            Formatter::from_config(&config),
            Formatter::External {
                program: "autopep8".into(),
                args: vec!["-".into()]
            }
        );
        assert_eq!(
            Formatter::from_config(&FormatterConfig::default()),
            Formatter::Builtin
        );
    }
}
