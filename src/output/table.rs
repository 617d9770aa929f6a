use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::types::{ApplicationDriftInfo, DeploymentVersionInfo};
use crate::version::{Drift, DriftIndicator};

/// Render the drift report: one row per application, one column per
/// configured context alias, plus the newest known upstream release.
pub fn render_drift_table(infos: &[ApplicationDriftInfo], context_order: &[String]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec!["Application".to_string()];
    header.extend(context_order.iter().cloned());
    header.push("Latest Release".to_string());
    table.set_header(header);

    for info in infos {
        let mut row = vec![Cell::new(&info.app_name)];
        for alias in context_order {
            row.push(match info.contexts.get(alias) {
                Some(entry) => context_cell(entry),
                None => Cell::new("-"),
            });
        }
        let latest = info
            .latest_release
            .as_ref()
            .map(|release| {
                format!(
                    "{} ({})",
                    release.version,
                    release.published_at.format("%Y-%m-%d")
                )
            })
            .unwrap_or_else(|| "-".to_string());
        row.push(Cell::new(latest));
        table.add_row(Row::from(row));
    }
    table.to_string()
}

fn context_cell(entry: &DeploymentVersionInfo) -> Cell {
    let text = match entry.drift {
        Drift::Behind(0) => format!("{} (up to date)", entry.deployed_version),
        Drift::Behind(1) => format!("{} (1 behind)", entry.deployed_version),
        Drift::Behind(n) => format!("{} ({n} behind)", entry.deployed_version),
        Drift::Unbounded => format!("{} (far behind)", entry.deployed_version),
        Drift::Unknown => format!("{} (unknown)", entry.deployed_version),
    };
    Cell::new(text).fg(indicator_color(entry.drift.indicator()))
}

fn indicator_color(indicator: DriftIndicator) -> Color {
    match indicator {
        DriftIndicator::UpToDate => Color::Green,
        DriftIndicator::Minor => Color::Yellow,
        DriftIndicator::Moderate => Color::DarkYellow,
        DriftIndicator::Severe => Color::Red,
        DriftIndicator::Unknown => Color::DarkGrey,
    }
}
