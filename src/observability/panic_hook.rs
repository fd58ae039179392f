//! Custom panic hook for structured crash reports.
//!
//! When a mining run crashes the report names the repository, phase, test
//! file and candidate that were in flight, and how many test targets had
//! been processed.

use super::context::{get_current_context, get_progress, MiningContext};
use std::panic::PanicHookInfo;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const RULE: &str =
    "════════════════════════════════════════════════════════════════════════════════";

/// Install the custom panic hook. Call early in `main`.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        print_crash_report(info);
    }));
}

fn print_crash_report(info: &PanicHookInfo<'_>) {
    let context = get_current_context();
    let (processed, total) = get_progress();

    eprintln!();
    eprintln!("{}", RULE);
    eprintln!("SYNCFORGE CRASH REPORT");
    eprintln!("{}", RULE);
    for line in report_lines(&extract_panic_message(info), &context, processed, total) {
        eprintln!("{}", line);
    }
    if let Some(location) = info.location() {
        eprintln!(
            "  Location: {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }
    if std::env::var("RUST_BACKTRACE").is_ok() {
        eprintln!("{}", std::backtrace::Backtrace::capture());
    } else {
        eprintln!("  Run with RUST_BACKTRACE=1 for stack trace");
    }
    eprintln!("{}", RULE);
}

fn report_lines(
    message: &str,
    context: &MiningContext,
    processed: usize,
    total: usize,
) -> Vec<String> {
    let mut lines = vec![
        format!("  Version: {}", VERSION),
        format!("  Platform: {}", std::env::consts::OS),
        format!(
            "  Time: {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!("  PANIC: {}", truncate(message, 200)),
    ];

    match &context.phase {
        Some(phase) => lines.push(format!("  Phase: {}", phase)),
        None => lines.push("  Phase: (not set - crash occurred before mining started)".into()),
    }
    if let Some(repo) = &context.repository {
        lines.push(format!("  Repository: {}", repo));
    }
    if let Some(file) = &context.test_file {
        lines.push(format!("  Test file: {}", file.display()));
    }
    if let Some(candidate) = &context.candidate {
        lines.push(format!("  Candidate: {}", candidate));
    }
    if total > 0 {
        let pct = (processed as f64 / total as f64 * 100.0) as usize;
        lines.push(format!(
            "  Progress: {} / {} test targets ({}%)",
            processed, total, pct
        ));
    }
    lines
}

fn extract_panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
