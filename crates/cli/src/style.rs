//! Terminal styling for CLI output.

use console::{Style, StyledObject};

use repocrawl_core::report::FileOutcome;

fn marked(marker: StyledObject<&'static str>, msg: &str) -> String {
    format!("{} {}", marker, msg)
}

/// Green checkmark prefix.
pub fn success(msg: &str) -> String {
    marked(Style::new().green().apply_to("✓"), msg)
}

/// Red cross prefix.
pub fn error(msg: &str) -> String {
    marked(Style::new().red().apply_to("✗"), msg)
}

/// Yellow warning prefix.
pub fn warn(msg: &str) -> String {
    marked(Style::new().yellow().apply_to("⚠"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Short status label for a file outcome, with its table colour.
pub fn outcome_label(outcome: &FileOutcome) -> (&'static str, Option<comfy_table::Color>) {
    match outcome {
        FileOutcome::Anonymized { .. } => ("✓ anonymized", Some(comfy_table::Color::Green)),
        FileOutcome::Copied => ("= copied", None),
        FileOutcome::Skipped { .. } => ("✗ skipped", Some(comfy_table::Color::Red)),
    }
}
