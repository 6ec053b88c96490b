//! Rendering of a finished sync batch.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use filesync_core::models::{MappingOutcome, SyncReport};

use crate::style;

/// One row per mapping, in batch order.
pub fn render(report: &SyncReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Mapping",
        "File",
        "Destination",
        "Branch",
        "Pull request",
        "Status",
    ]);

    for outcome in &report.outcomes {
        table.add_row(row(outcome));
    }
    table
}

fn row(outcome: &MappingOutcome) -> Vec<Cell> {
    let mut cells = vec![
        Cell::new(&outcome.name),
        Cell::new(&outcome.source_filename),
        Cell::new(outcome.dest_repo.to_string()),
    ];

    match &outcome.result {
        Ok(pr) => {
            let status = if pr.opened {
                format!("✓ {}, opened", pr.file_action)
            } else {
                format!("✓ {}, reused", pr.file_action)
            };
            cells.push(Cell::new(format!("{} → {}", pr.working_branch, pr.base_branch)));
            cells.push(Cell::new(format!("#{} {}", pr.number, pr.html_url)));
            cells.push(Cell::new(status).fg(comfy_table::Color::Green));
        }
        Err(e) => {
            cells.push(Cell::new("—"));
            cells.push(Cell::new("—"));
            cells.push(Cell::new(format!("✗ {}", e)).fg(comfy_table::Color::Red));
        }
    }
    cells
}

/// One-line summary printed under the table.
pub fn summary(report: &SyncReport) -> String {
    let total = report.outcomes.len();
    let failed = report.failed().count();
    if total == 0 {
        style::warn("No mappings configured")
    } else if failed == 0 {
        style::success(&format!("{} of {} mappings synced", total, total))
    } else {
        style::error(&format!(
            "{} of {} mappings failed {}",
            failed,
            total,
            style::dim("(see log for details)")
        ))
    }
}
