//! Terminal styling for sync output.
//!
//! `console` drops the colours on its own when stdout is not a terminal, so
//! Actions logs stay readable.

use console::{style, StyledObject};

fn marked(mark: StyledObject<&str>, msg: &str) -> String {
    format!("{} {}", mark, msg)
}

/// Line for a mapping or command that finished cleanly.
pub fn success(msg: &str) -> String {
    marked(style("✓").green(), msg)
}

/// Line for a failure, printed to stderr by `main`.
pub fn error(msg: &str) -> String {
    marked(style("✗").red().bold(), msg)
}

pub fn warn(msg: &str) -> String {
    marked(style("!").yellow(), msg)
}

/// Section title above the results table.
pub fn header(msg: &str) -> String {
    style(msg).bold().underlined().to_string()
}

pub fn dim(msg: &str) -> String {
    style(msg).dim().to_string()
}
