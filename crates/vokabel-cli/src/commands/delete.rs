use std::path::Path;

use crate::commands::common::{
    normalize_entry_identifier, open_client, resolve_entry, warn_data_loss,
};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let (client, _config) = open_client(db_path)?;
    let entry = resolve_entry(&normalized_id, &client).await?;

    client.delete(&entry.id).await?;
    warn_data_loss(&client).await;
    println!("{}", entry.id);
    Ok(())
}
