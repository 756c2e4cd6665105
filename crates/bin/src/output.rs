//! Output formatting helpers for human-readable and JSON output.

use ordinal::{ContainerId, Item, MoveOutcome};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned table
    Human,
    /// One JSON document per command
    Json,
}

/// Print a table with aligned columns in human-readable format.
///
/// `headers` and each row in `rows` must have the same length.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }

    let col_count = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(col_count) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:<width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_line.join("  ").trim_end());

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .take(col_count)
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        println!("{}", line.join("  ").trim_end());
    }
}

/// Print the items of one container, in order.
pub fn print_items(
    container: &ContainerId,
    items: &[Item],
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Human => {
            if items.is_empty() {
                println!("Container {container} is empty.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    vec![
                        (index + 1).to_string(),
                        item.id.to_string(),
                        item.position.value.to_string(),
                    ]
                })
                .collect();
            print_table(&["#", "ITEM", "KEY"], &rows);
        }
        OutputFormat::Json => {
            let entries: Vec<_> = items
                .iter()
                .map(|item| {
                    serde_json::json!({
                        "id": item.id,
                        "position": item.position.value,
                    })
                })
                .collect();
            let value = serde_json::json!({ "container": container, "items": entries });
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(())
}

/// Print the result of a move.
pub fn print_outcome(
    container: &ContainerId,
    outcome: &MoveOutcome,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Human => {
            let item = outcome.key.item();
            if outcome.unchanged {
                println!("{item} is already in place in {container} (key {})", outcome.key.value);
            } else {
                println!("{item} -> {container} at key {}", outcome.key.value);
            }
            if outcome.rebalanced {
                println!("(container {container} was rebalanced to make room)");
            }
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "container": container,
                "item": outcome.key.item(),
                "position": outcome.key.value,
                "rebalanced": outcome.rebalanced,
                "unchanged": outcome.unchanged,
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(())
}
