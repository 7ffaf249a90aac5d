//! Interactive session. Every mutation schedules a debounced sync, startup
//! triggers one immediately, and leaving the shell flushes a pending window.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use vokabel_core::sync::{SyncEvent, SyncScheduler};
use vokabel_core::timestamp;
use vokabel_core::Entry;

use crate::commands::common::{
    format_conflict_lines, format_entry_lines, format_report, open_client, resolve_entry,
    warn_data_loss, Client,
};
use crate::error::CliError;

const HELP: &str = "\
Commands:
  add <word> = <translation>   add a word
  delete <id>                  delete a word (id or unique prefix)
  list                         show words
  conflicts                    show conflicts awaiting a decision
  sync                         sync now
  help                         show this help
  quit                         sync pending changes and leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Add { german: String, english: String },
    Delete(String),
    List,
    Conflicts,
    Sync,
    Help,
    Quit,
    Nothing,
}

pub fn parse_shell_line(line: &str) -> Result<ShellCommand, String> {
    let line = line.trim();
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

    match verb.to_ascii_lowercase().as_str() {
        "" => Ok(ShellCommand::Nothing),
        "add" | "new" => {
            let (german, english) = rest
                .split_once('=')
                .or_else(|| rest.split_once(char::is_whitespace))
                .map(|(german, english)| (german.trim(), english.trim()))
                .filter(|(german, english)| !german.is_empty() && !english.is_empty())
                .ok_or_else(|| "usage: add <word> = <translation>".to_string())?;
            Ok(ShellCommand::Add {
                german: german.to_string(),
                english: english.to_string(),
            })
        }
        "delete" | "rm" => {
            if rest.is_empty() {
                Err("usage: delete <id>".to_string())
            } else {
                Ok(ShellCommand::Delete(rest.to_string()))
            }
        }
        "list" | "ls" => Ok(ShellCommand::List),
        "conflicts" => Ok(ShellCommand::Conflicts),
        "sync" => Ok(ShellCommand::Sync),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" => Ok(ShellCommand::Quit),
        other => Err(format!("unknown command '{other}'; type `help`")),
    }
}

pub async fn run_shell(db_path: &Path) -> Result<(), CliError> {
    let (client, config) = open_client(db_path)?;
    let client = Arc::new(client);

    let background = if client.transport().is_offline() {
        println!("Offline: VOKABEL_SERVER_URL is not set, changes stay on this device.");
        None
    } else {
        let (scheduler, events) = SyncScheduler::spawn(Arc::clone(&client), config.sync_debounce);
        let printer = spawn_event_printer(events);
        scheduler.sync_now();
        Some((scheduler, printer))
    };
    let scheduler = background.as_ref().map(|(scheduler, _)| scheduler);

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_shell_line(&line) {
            Ok(ShellCommand::Quit) => break,
            Ok(command) => {
                if let Err(error) = execute(&client, command, scheduler).await {
                    eprintln!("Error: {error}");
                }
            }
            Err(message) => eprintln!("{message}"),
        }
    }

    if let Some((scheduler, printer)) = background {
        scheduler.shutdown().await;
        if let Err(error) = printer.await {
            tracing::warn!(error = %error, "Sync event printer ended abnormally");
        }
    }
    Ok(())
}

async fn execute(
    client: &Client,
    command: ShellCommand,
    scheduler: Option<&SyncScheduler>,
) -> Result<(), CliError> {
    match command {
        ShellCommand::Add { german, english } => {
            let entry = client.upsert(Entry::new(german, english)).await?;
            println!("{}", entry.id);
            schedule(scheduler);
        }
        ShellCommand::Delete(query) => {
            let entry = resolve_entry(&query, client).await?;
            client.delete(&entry.id).await?;
            println!("{}", entry.id);
            schedule(scheduler);
        }
        ShellCommand::List => {
            for line in format_entry_lines(&client.entries().await, timestamp::now()) {
                println!("{line}");
            }
        }
        ShellCommand::Conflicts => {
            for line in format_conflict_lines(&client.conflicts().await) {
                println!("{line}");
            }
        }
        ShellCommand::Sync => match scheduler {
            Some(scheduler) => scheduler.sync_now(),
            None => return Err(CliError::SyncNotConfigured),
        },
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Quit | ShellCommand::Nothing => {}
    }
    warn_data_loss(client).await;
    Ok(())
}

fn schedule(scheduler: Option<&SyncScheduler>) {
    if let Some(scheduler) = scheduler {
        scheduler.schedule();
    }
}

fn spawn_event_printer(
    mut events: tokio::sync::mpsc::UnboundedReceiver<SyncEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SyncEvent::Completed(report) => {
                    for line in format_report(&report) {
                        println!("{line}");
                    }
                }
                SyncEvent::Failed(error) if error.is_retryable() => {
                    eprintln!("Sync failed: {error}; retrying after the next change");
                }
                SyncEvent::Failed(error) => eprintln!("Sync failed: {error}"),
            }
        }
    })
}
