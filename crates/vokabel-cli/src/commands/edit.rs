use std::path::Path;

use vokabel_core::util::normalize_text_option;
use vokabel_core::Entry;

use crate::cli::EntryFields;
use crate::commands::common::{
    apply_fields, capture_editor_input_with_initial, normalize_entry_identifier, open_client,
    resolve_entry, warn_data_loss, EditableEntry,
};
use crate::error::CliError;

/// Field flags given to `edit`
pub struct EditRequest<'a> {
    pub german: Option<&'a str>,
    pub english: Option<&'a str>,
    pub fields: &'a EntryFields,
}

impl EditRequest<'_> {
    pub fn is_empty(&self) -> bool {
        self.german.is_none() && self.english.is_none() && self.fields.is_empty()
    }

    pub fn apply(&self, mut entry: Entry) -> Result<Entry, CliError> {
        if let Some(german) = self.german {
            entry.german =
                normalize_text_option(Some(german.to_string())).ok_or(CliError::MissingText)?;
        }
        if let Some(english) = self.english {
            entry.english =
                normalize_text_option(Some(english.to_string())).ok_or(CliError::MissingText)?;
        }
        Ok(apply_fields(entry, self.fields))
    }
}

/// Parse the editor buffer back into `entry`.
pub fn apply_edited_json(entry: Entry, edited: &str) -> Result<Entry, CliError> {
    let editable: EditableEntry = serde_json::from_str(edited)
        .map_err(|error| CliError::InvalidEdit(error.to_string()))?;
    editable.apply(entry)
}

pub async fn run_edit(id: &str, request: &EditRequest<'_>, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let (client, _config) = open_client(db_path)?;
    let entry = resolve_entry(&normalized_id, &client).await?;

    let edited = if request.is_empty() {
        let initial = serde_json::to_string_pretty(&EditableEntry::from_entry(&entry))?;
        let buffer = capture_editor_input_with_initial(&initial)?;
        apply_edited_json(entry.clone(), &buffer)?
    } else {
        request.apply(entry.clone())?
    };

    if edited == entry {
        println!("{}", entry.id);
        return Ok(());
    }

    let updated = client.upsert(edited).await?;
    warn_data_loss(&client).await;
    println!("{}", updated.id);
    Ok(())
}
