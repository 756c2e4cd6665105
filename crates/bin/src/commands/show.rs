//! Read-only commands.

use ordinal::{ContainerId, OrderedCollection};

use crate::output::{OutputFormat, print_items, print_table};

/// Run the `containers` command
pub async fn containers(
    collection: &OrderedCollection,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let containers = collection.containers().await?;

    match format {
        OutputFormat::Human => {
            if containers.is_empty() {
                println!("No containers found.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = containers
                .iter()
                .map(|(id, count)| vec![id.to_string(), count.to_string()])
                .collect();
            print_table(&["CONTAINER", "ITEMS"], &rows);
        }
        OutputFormat::Json => {
            let entries: Vec<_> = containers
                .iter()
                .map(|(id, count)| serde_json::json!({ "id": id, "items": count }))
                .collect();
            println!("{}", serde_json::to_string(&entries)?);
        }
    }
    Ok(())
}

/// Run the `list` command
pub async fn list(
    collection: &OrderedCollection,
    container: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let container = ContainerId::from(container);
    let items: Vec<_> = collection.ordered_items(&container).await?.collect();
    print_items(&container, &items, format)
}
