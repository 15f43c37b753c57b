//! Rendering of run summaries.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use repocrawl_core::report::{FileOutcome, RunSummary};

use crate::style;

/// Print a per-file table followed by totals.
pub fn print_summary(summary: &RunSummary) {
    if summary.files.is_empty() {
        println!("{}", style::warn("No files found under the storage path."));
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Repository", "File", "Status", "Rows", "Cells", "Detail"]);

    for report in &summary.files {
        let repository = if report.repository.is_empty() {
            "—".to_string()
        } else {
            report.repository.clone()
        };
        let file = report.file.display().to_string();
        let (label, colour) = style::outcome_label(&report.outcome);
        let status = match colour {
            Some(colour) => Cell::new(label).fg(colour),
            None => Cell::new(label),
        };

        let row = match &report.outcome {
            FileOutcome::Anonymized {
                rows,
                rows_filtered,
                cells_changed,
                missing_columns,
            } => {
                let mut detail = Vec::new();
                if *rows_filtered > 0 {
                    detail.push(format!("{} row(s) filtered", rows_filtered));
                }
                if !missing_columns.is_empty() {
                    detail.push(format!("missing: {}", missing_columns.join(", ")));
                }
                vec![
                    Cell::new(repository),
                    Cell::new(file),
                    status,
                    Cell::new(rows),
                    Cell::new(cells_changed),
                    Cell::new(detail.join("; ")),
                ]
            }
            FileOutcome::Copied => vec![
                Cell::new(repository),
                Cell::new(file),
                status,
                Cell::new("—"),
                Cell::new("—"),
                Cell::new(""),
            ],
            FileOutcome::Skipped { reason } => vec![
                Cell::new(repository),
                Cell::new(file),
                status,
                Cell::new("—"),
                Cell::new("—"),
                Cell::new(reason),
            ],
        };
        table.add_row(row);
    }

    println!("{}", table);
    println!();

    let totals = format!(
        "{} anonymized, {} copied, {} skipped",
        summary.anonymized(),
        summary.copied(),
        summary.skipped()
    );
    if summary.is_complete() {
        println!("{}", style::success(&totals));
    } else {
        println!("{}", style::error(&totals));
    }
    if let Some(finished) = summary.finished_at {
        let elapsed = finished - summary.started_at;
        println!(
            "{}",
            style::dim(&format!("finished in {} ms", elapsed.num_milliseconds()))
        );
    }
}
