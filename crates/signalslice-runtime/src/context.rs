//! Display helpers shared by the subcommands: color resolution and ANSI styling.

use signalslice_core::{Severity, SourceMode};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";

/// Resolve `--color auto|always|never` against stdout.
pub fn resolve_color(color: &str) -> bool {
    use std::io::IsTerminal;
    match color {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}

pub fn severity_style(severity: Severity) -> &'static str {
    match severity {
        Severity::Normal => "",
        Severity::Success => "\x1b[32m",
        Severity::Warning => "\x1b[33m",
        Severity::Critical => "\x1b[1;31m",
    }
}

pub fn mode_style(mode: SourceMode) -> &'static str {
    match mode {
        SourceMode::Live => "\x1b[1;32m",
        SourceMode::Polling => "\x1b[1;33m",
        SourceMode::Connecting => "\x1b[36m",
        SourceMode::Failed => "\x1b[1;31m",
    }
}

/// Wrap `text` in `style` when color is on and the style is non-empty.
pub fn paint(text: &str, style: &str, use_color: bool) -> String {
    if use_color && !style.is_empty() {
        format!("{style}{text}{RESET}")
    } else {
        text.to_string()
    }
}
