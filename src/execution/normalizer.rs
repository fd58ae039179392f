//! Parsers that turn raw runner output into a [`TestResultSummary`].

use once_cell::sync::Lazy;
use regex::Regex;

use super::summary::{OutcomeCounts, TestResultSummary};

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B[@-_][0-?]*[ -/]*[@-~]").expect("valid ANSI regex"));

/// The `=== ... in 0.12s ===` trailer printed by pytest.
static PYTEST_SUMMARY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^.*=+ .*\b(passed|failed|errors?|skipped|deselected|xfailed|xpassed|warnings?|no tests ran)\b.* =+.*$",
    )
    .expect("valid summary line regex")
});

static PYTEST_COLLECTION_ERRORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"=+\s+ERRORS\s+=+\n[\s\S]*?=+ short test summary info =+")
        .expect("valid collection error regex")
});

static UNITTEST_TRAILER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Ran (\d+) tests? in .* - (\d+) failures?, (\d+) errors?")
        .expect("valid unittest trailer regex")
});

static UNITTEST_RAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Ran (\d+) tests?").expect("valid unittest ran regex"));

static UNITTEST_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:FAILED|OK) \(([^)]*)\)").expect("valid unittest status regex")
});

static UNITTEST_FAILURES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) failures?").expect("valid failures regex"));

static UNITTEST_ERRORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) errors?").expect("valid errors regex"));

/// A pytest outcome word and the regex that reads its count.
struct Outcome {
    keyword: &'static str,
    pattern: Regex,
}

fn outcome(keyword: &'static str, word: &str) -> Outcome {
    Outcome {
        keyword,
        pattern: Regex::new(&format!(r"(?:^|[\s,])(\d+) {}\b", word))
            .expect("valid outcome regex"),
    }
}

static PASSED: Lazy<Outcome> = Lazy::new(|| outcome(" passed", "passed"));
static XPASSED: Lazy<Outcome> = Lazy::new(|| outcome(" xpassed", "xpassed"));
static FAILED: Lazy<Outcome> = Lazy::new(|| outcome(" failed", "failed"));
static XFAILED: Lazy<Outcome> = Lazy::new(|| outcome(" xfailed", "xfailed"));
static DESELECTED: Lazy<Outcome> = Lazy::new(|| outcome(" deselected", "deselected"));
static SKIPPED: Lazy<Outcome> = Lazy::new(|| outcome(" skipped", "skipped"));
static WARNING: Lazy<Outcome> = Lazy::new(|| outcome(" warning", "warnings?"));
static ERROR: Lazy<Outcome> = Lazy::new(|| outcome(" error", "errors?"));

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

fn capture_u32(pattern: &Regex, text: &str, group: usize) -> Option<u32> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(group))
        .and_then(|m| m.as_str().parse().ok())
}

/// Re-read a count from the token right before the last `keyword`, after
/// removing color codes that defeat the primary pattern.
fn rectify(text: &str, keyword: &str) -> u32 {
    let plain = strip_ansi(text);
    let Some(index) = plain.rfind(keyword) else {
        return 0;
    };
    let token = plain[..index].rsplit(' ').next().unwrap_or("");
    match token.trim().parse() {
        Ok(count) => count,
        Err(_) => {
            log::debug!(
                "Discarding unreadable `{}` count: {:?}",
                keyword.trim(),
                token
            );
            0
        }
    }
}

fn count(outcome: &Outcome, text: &str) -> u32 {
    match capture_u32(&outcome.pattern, text, 1) {
        Some(n) if n > 0 => n,
        _ if text.contains(outcome.keyword) => rectify(text, outcome.keyword),
        _ => 0,
    }
}

/// Normalize verbose pytest output.
///
/// Counts are read from the final summary line when one is present, else
/// from the whole text. A collection-error block counts as one error unless
/// the summary reports its own error count.
pub fn parse_pytest(stdout: &str) -> TestResultSummary {
    let scope = PYTEST_SUMMARY_LINE
        .find_iter(stdout)
        .last()
        .map(|m| m.as_str())
        .unwrap_or(stdout);

    let mut error = count(&ERROR, scope);
    if error == 0 && PYTEST_COLLECTION_ERRORS.is_match(stdout) {
        error = 1;
    }

    TestResultSummary::new(OutcomeCounts {
        passed: count(&PASSED, scope),
        xpassed: count(&XPASSED, scope),
        failed: count(&FAILED, scope),
        xfailed: count(&XFAILED, scope),
        deselected: count(&DESELECTED, scope),
        skipped: count(&SKIPPED, scope),
        warning: count(&WARNING, scope),
        error,
    })
}

/// Normalize unittest output (both streams concatenated).
pub fn parse_unittest(output: &str) -> TestResultSummary {
    if let Some(caps) = UNITTEST_TRAILER.captures(output) {
        let field = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
        let (ran, failed, error) = (field(1), field(2), field(3));
        return TestResultSummary::new(OutcomeCounts {
            passed: ran.saturating_sub(failed.saturating_add(error)),
            failed,
            error,
            ..Default::default()
        });
    }

    let ran = capture_u32(&UNITTEST_RAN, output, 1).unwrap_or(0);
    let mut counts = OutcomeCounts::default();

    if let Some(caps) = UNITTEST_STATUS.captures_iter(output).last() {
        for item in caps[1].split(',') {
            let Some((key, value)) = item.split_once('=') else {
                continue;
            };
            let value = value.trim().parse().unwrap_or(0);
            match key.trim() {
                "failures" => counts.failed = value,
                "errors" => counts.error = value,
                "skipped" => counts.skipped = value,
                "expected failures" => counts.xfailed = value,
                "unexpected successes" => counts.xpassed = value,
                _ => {}
            }
        }
    } else {
        counts.failed = capture_u32(&UNITTEST_FAILURES, output, 1).unwrap_or(0);
        counts.error = capture_u32(&UNITTEST_ERRORS, output, 1).unwrap_or(0);
    }

    let accounted = [counts.error, counts.skipped, counts.xfailed, counts.xpassed]
        .into_iter()
        .fold(counts.failed, u32::saturating_add);
    counts.passed = ran.saturating_sub(accounted);
    TestResultSummary::new(counts)
}
