use clap::Parser;
use pretty_assertions::assert_eq;
use vokabel_core::db::SqliteKeyValueStore;
use vokabel_core::store::PersistReport;
use vokabel_core::sync::{Resolution, SyncClient};
use vokabel_core::timestamp::parse;
use vokabel_core::{Conflict, Entry, SyncState};

use crate::cli::{Cli, Commands, EntryFields};
use crate::commands::add::new_entry;
use crate::commands::common::{
    apply_fields, default_editor, format_conflict_lines, format_data_loss, format_entry_lines,
    format_relative_time, format_timestamp, normalize_entry_identifier, pick_unique_id,
    resolve_conflict_id, resolve_entry, truncate_chars, Client, EditableEntry,
};
use crate::commands::edit::{apply_edited_json, EditRequest};
use crate::commands::shell::{parse_shell_line, ShellCommand};
use crate::commands::sync::{format_status_lines, status_item};
use crate::error::CliError;
use crate::transport::CliTransport;

fn offline_client() -> Client {
    SyncClient::open(
        SqliteKeyValueStore::open_in_memory().unwrap(),
        CliTransport::Offline,
    )
    .unwrap()
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn format_timestamp_returns_utc_label() {
    assert_eq!(
        format_timestamp(parse("1970-01-01T00:00:00Z").unwrap()),
        "1970-01-01 00:00:00 UTC"
    );
}

#[test]
fn truncate_chars_adds_ellipsis() {
    assert_eq!(
        truncate_chars("This is a very long sentence that should be shortened", 20),
        "This is a very lo..."
    );
    assert_eq!(truncate_chars("  kurz  und   gut ", 20), "kurz und gut");
}

#[test]
fn normalize_entry_identifier_rejects_empty() {
    assert!(matches!(
        normalize_entry_identifier(" \n "),
        Err(CliError::EmptyEntryId)
    ));
    assert_eq!(normalize_entry_identifier("  abc123  ").unwrap(), "abc123");
}

#[test]
fn pick_unique_id_reports_ambiguity() {
    let ids = vec![
        "11111111-1111-7111-8111-111111111111".to_string(),
        "11111111-1111-7111-8111-222222222222".to_string(),
    ];
    let err = pick_unique_id("1111", &ids).unwrap_err();
    assert!(err.to_string().contains("ambiguous"));
    assert!(matches!(
        pick_unique_id("9999", &[]),
        Err(CliError::EntryNotFound(_))
    ));
    assert_eq!(pick_unique_id("1111", &ids[..1]).unwrap(), ids[0]);
}

#[test]
fn new_entry_requires_both_texts() {
    let fields = EntryFields {
        part_of_speech: Some("noun".to_string()),
        ..EntryFields::default()
    };
    let entry = new_entry(" Hund ", "dog", &fields).unwrap();
    assert_eq!(entry.german, "Hund");
    assert_eq!(entry.part_of_speech.as_deref(), Some("noun"));
    assert!(matches!(
        new_entry("Hund", "  ", &fields),
        Err(CliError::MissingText)
    ));
}

#[test]
fn apply_fields_clears_with_empty_value() {
    let mut entry = Entry::with_id("e1", "Hund", "dog");
    entry.notes = Some("old".to_string());
    let fields = EntryFields {
        notes: Some(String::new()),
        examples: vec!["Der Hund bellt.".to_string(), "  ".to_string()],
        ..EntryFields::default()
    };

    let updated = apply_fields(entry, &fields);
    assert_eq!(updated.notes, None);
    assert_eq!(updated.examples, vec!["Der Hund bellt.".to_string()]);
}

#[test]
fn edit_request_only_touches_given_fields() {
    let fields = EntryFields::default();
    let request = EditRequest {
        german: None,
        english: Some("hound"),
        fields: &fields,
    };
    assert!(!request.is_empty());

    let edited = request.apply(Entry::with_id("e1", "Hund", "dog")).unwrap();
    assert_eq!(edited.german, "Hund");
    assert_eq!(edited.english, "hound");
}

#[test]
fn editor_buffer_round_trips_editable_fields() {
    let mut entry = Entry::with_id("e1", "Hund", "dog");
    entry.part_of_speech = Some("noun".to_string());
    let buffer = serde_json::to_string_pretty(&EditableEntry::from_entry(&entry)).unwrap();

    let unchanged = apply_edited_json(entry.clone(), &buffer).unwrap();
    assert_eq!(unchanged, entry);

    let edited = apply_edited_json(
        entry.clone(),
        r#"{"german": "Hund", "english": "dog", "notes": "loyal"}"#,
    )
    .unwrap();
    assert_eq!(edited.notes.as_deref(), Some("loyal"));
    assert_eq!(edited.part_of_speech, None);
    assert_eq!(edited.id, "e1");

    assert!(matches!(
        apply_edited_json(entry, "not json"),
        Err(CliError::InvalidEdit(_))
    ));
}

#[test]
fn format_entry_lines_include_short_id_and_summary() {
    let now = parse("2024-01-02T00:00:00Z").unwrap();
    let entry = Entry::with_id("11111111-1111-7111-8111-111111111111", "Hund", "dog")
        .updated(parse("2024-01-01T00:00:00Z").unwrap());

    let lines = format_entry_lines(&[entry], now);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("11111111-1111"));
    assert!(lines[0].contains("Hund = dog"));
    assert!(lines[0].ends_with("1d ago"));
}

#[test]
fn format_conflict_lines_describe_both_sides() {
    let local = Entry::with_id("e1", "Hund", "dog");
    let remote = Entry::with_id("e1", "Hund", "hound");
    let lines = format_conflict_lines(&[
        Conflict::update(local, remote.clone()),
        Conflict::delete(remote),
    ]);

    assert!(lines[0].contains("update"));
    assert!(lines[0].contains("local: Hund = dog"));
    assert!(lines[0].contains("remote: Hund = hound"));
    assert!(lines[1].contains("delete"));
    assert!(lines[1].contains("local: (deleted)"));
}

#[test]
fn format_data_loss_mentions_each_step() {
    let report = PersistReport {
        stripped_media: vec!["e1".to_string()],
        dropped: vec!["e2".to_string(), "e3".to_string()],
    };
    let lines = format_data_loss(&report);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("inline media from 1"));
    assert!(lines[1].contains("dropped 2 entries: e2, e3"));
}

#[test]
fn status_lines_show_offline_device() {
    let mut state = SyncState::with_client_id("device-a".to_string());
    state.mark_deleted("e1");
    let status = status_item(&state, None, 3);

    let lines = format_status_lines(&status);
    assert!(lines[0].ends_with("device-a"));
    assert!(lines[1].ends_with("(offline)"));
    assert!(lines[3].ends_with("never"));
    assert!(lines[4].ends_with('1'));
}

#[test]
fn shell_lines_parse_into_commands() {
    assert_eq!(
        parse_shell_line("add der Hund = the dog").unwrap(),
        ShellCommand::Add {
            german: "der Hund".to_string(),
            english: "the dog".to_string(),
        }
    );
    assert_eq!(
        parse_shell_line("add Katze cat").unwrap(),
        ShellCommand::Add {
            german: "Katze".to_string(),
            english: "cat".to_string(),
        }
    );
    assert_eq!(
        parse_shell_line("rm 0192").unwrap(),
        ShellCommand::Delete("0192".to_string())
    );
    assert_eq!(parse_shell_line("   ").unwrap(), ShellCommand::Nothing);
    assert_eq!(parse_shell_line("EXIT").unwrap(), ShellCommand::Quit);
    assert!(parse_shell_line("add Hund").is_err());
    assert!(parse_shell_line("fly").is_err());
}

#[test]
fn cli_parses_resolve_and_add_flags() {
    let cli = Cli::try_parse_from(["vokabel", "resolve", "0192", "keep-remote"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Resolve { resolution: Resolution::KeepRemote, .. })
    ));

    let cli = Cli::try_parse_from([
        "vokabel", "add", "Hund", "dog", "--pos", "noun", "--example", "Der Hund bellt.",
    ])
    .unwrap();
    let Some(Commands::Add { fields, .. }) = cli.command else {
        panic!("expected add");
    };
    assert_eq!(fields.part_of_speech.as_deref(), Some("noun"));
    assert_eq!(fields.examples, vec!["Der Hund bellt.".to_string()]);

    assert!(Cli::try_parse_from(["vokabel", "resolve", "0192", "flip-a-coin"]).is_err());
}

#[tokio::test]
async fn resolve_entry_supports_exact_and_prefix_id() {
    let client = offline_client();
    client
        .upsert(Entry::with_id(
            "11111111-1111-7111-8111-111111111111",
            "Hund",
            "dog",
        ))
        .await
        .unwrap();
    client
        .upsert(Entry::with_id(
            "11111111-1111-7111-8111-222222222222",
            "Katze",
            "cat",
        ))
        .await
        .unwrap();

    let exact = resolve_entry("11111111-1111-7111-8111-111111111111", &client)
        .await
        .unwrap();
    assert_eq!(exact.german, "Hund");

    let by_prefix = resolve_entry("11111111-1111-7111-8111-2", &client)
        .await
        .unwrap();
    assert_eq!(by_prefix.german, "Katze");

    let ambiguous = resolve_entry("11111111", &client).await.unwrap_err();
    assert!(matches!(ambiguous, CliError::AmbiguousEntryId(_)));
}

#[test]
fn resolve_conflict_id_matches_prefix() {
    let remote = Entry::with_id("11111111-1111-7111-8111-111111111111", "Hund", "dog");
    let conflicts = vec![Conflict::delete(remote)];

    assert_eq!(
        resolve_conflict_id("1111", &conflicts).unwrap(),
        "11111111-1111-7111-8111-111111111111"
    );
    assert!(matches!(
        resolve_conflict_id("2222", &conflicts),
        Err(CliError::NoConflict(_))
    ));
}

#[tokio::test]
async fn offline_client_refuses_to_sync() {
    let client = offline_client();
    assert!(client.transport().is_offline());
    let err = client.sync().await.unwrap_err();
    assert!(err.to_string().contains("VOKABEL_SERVER_URL"));
}
