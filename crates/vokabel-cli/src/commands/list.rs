use std::path::Path;

use vokabel_core::timestamp;

use crate::commands::common::{
    entry_to_list_item, format_entry_lines, open_client, EntryListItem,
};
use crate::error::CliError;

pub async fn run_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let (client, _config) = open_client(db_path)?;
    let entries = client
        .entries()
        .await
        .into_iter()
        .take(limit)
        .collect::<Vec<_>>();
    let now = timestamp::now();

    if as_json {
        let json_items = entries
            .iter()
            .map(|entry| entry_to_list_item(entry, now))
            .collect::<Vec<EntryListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if entries.is_empty() {
        println!("No words yet. Add one with `vokabel add <word> <translation>`.");
    } else {
        for line in format_entry_lines(&entries, now) {
            println!("{line}");
        }
    }

    Ok(())
}
