//! Commands that change positions.

use ordinal::{ContainerId, ItemId, OrderedCollection, Placement};

use crate::cli::{Commands, EdgeArgs, RelativeArgs};
use crate::output::{OutputFormat, print_outcome};

/// Run any mutating command.
pub async fn run(
    collection: &OrderedCollection,
    command: &Commands,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Add {
            container,
            item,
            top,
        } => {
            let container = ContainerId::from(container.as_str());
            let item = item
                .as_deref()
                .map(ItemId::from)
                .unwrap_or_else(ItemId::generate);
            if collection.store().get_item(&item).await?.is_some() {
                return Err(format!("Item {item} already exists").into());
            }
            let placement = if *top { Placement::Top } else { Placement::Bottom };
            let outcome = collection.place(&container, &item, placement).await?;
            print_outcome(&container, &outcome, format)
        }
        Commands::Before(args) => relative(collection, args, true, format).await,
        Commands::After(args) => relative(collection, args, false, format).await,
        Commands::Top(args) => edge(collection, args, Placement::Top, format).await,
        Commands::Bottom(args) => edge(collection, args, Placement::Bottom, format).await,
        Commands::Reparent {
            item,
            container,
            top,
        } => {
            let container = ContainerId::from(container.as_str());
            let placement = if *top { Placement::Top } else { Placement::Bottom };
            let outcome = collection
                .move_to_container(&ItemId::from(item.as_str()), &container, placement)
                .await?;
            print_outcome(&container, &outcome, format)
        }
        Commands::Remove { item } => {
            let removed = collection.remove(&ItemId::from(item.as_str())).await?;
            match format {
                OutputFormat::Human if removed => println!("Removed {item}"),
                OutputFormat::Human => println!("No item {item}"),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string(&serde_json::json!({ "item": item, "removed": removed }))?
                ),
            }
            Ok(())
        }
        Commands::Rebalance { container } => {
            let container = ContainerId::from(container.as_str());
            let count = collection.rebalance(&container).await?;
            match format {
                OutputFormat::Human if count == 0 => {
                    println!("Container {container} is already evenly spaced")
                }
                OutputFormat::Human => println!("Re-keyed {count} items in {container}"),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string(
                        &serde_json::json!({ "container": container, "rekeyed": count })
                    )?
                ),
            }
            Ok(())
        }
        Commands::Containers | Commands::List { .. } => {
            Err("not a mutating command".into())
        }
    }
}

/// Existing items only: these commands never create.
async fn require_item(
    collection: &OrderedCollection,
    item: &ItemId,
) -> Result<(), Box<dyn std::error::Error>> {
    if collection.store().get_item(item).await?.is_none() {
        return Err(format!("No item {item}; use `add` to create it").into());
    }
    Ok(())
}

async fn relative(
    collection: &OrderedCollection,
    args: &RelativeArgs,
    before: bool,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let container = ContainerId::from(args.container.as_str());
    let item = ItemId::from(args.item.as_str());
    let reference = ItemId::from(args.reference.as_str());
    require_item(collection, &item).await?;

    let outcome = if before {
        collection.insert_before(&container, &item, &reference).await?
    } else {
        collection.insert_after(&container, &item, &reference).await?
    };
    print_outcome(&container, &outcome, format)
}

async fn edge(
    collection: &OrderedCollection,
    args: &EdgeArgs,
    placement: Placement,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let container = ContainerId::from(args.container.as_str());
    let item = ItemId::from(args.item.as_str());
    require_item(collection, &item).await?;

    let outcome = collection.place(&container, &item, placement).await?;
    print_outcome(&container, &outcome, format)
}
