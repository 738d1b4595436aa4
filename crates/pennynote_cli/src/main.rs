//! `pennynote` command line front end.
//!
//! # Responsibility
//! - Load config, start logging and open the core stores.
//! - Run one feed operation for one owner and print the result as JSON.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{CliConfig, Command};
use log::{info, warn};
use pennynote_core::{
    init_logging, AttachmentOutcome, AttachmentUpload, CoreApp, CoreConfig,
    CreateNoteRequest, DeleteNoteRequest, EditSession, EditSessionError, MutationReport, NoteId,
    OwnerIdentity, SyncError, SyncOrchestrator,
};
use std::path::Path;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli_config = CliConfig::parse();

    let config = CoreConfig::load(&cli_config.config)
        .with_context(|| format!("loading {}", cli_config.config.display()))?;
    init_logging(&config.logging).context("starting logging")?;

    let owner = OwnerIdentity::new(cli_config.owner.as_str())?;
    let app = CoreApp::open(&config)?;
    let orchestrator = app.orchestrator_for(owner);
    info!(
        "event=cli_start module=cli status=ok owner={}",
        orchestrator.owner()
    );

    match cli_config.command {
        Command::List => {
            let feed = orchestrator.refresh().await?;
            println!("{}", serde_json::to_string_pretty(&*feed)?);
        }
        Command::Create {
            name,
            description,
            image,
        } => {
            let attachment = match image {
                Some(path) => Some(read_upload(&path).await?),
                None => None,
            };
            let result = orchestrator
                .create(CreateNoteRequest {
                    name,
                    description,
                    attachment,
                })
                .await;
            print_outcome(result)?;
        }
        Command::Update {
            id,
            name,
            description,
        } => {
            let mut session = open_session(&orchestrator, id).await?;
            let result = match session.submit(&orchestrator, name, description).await {
                Ok(report) => Ok(report),
                Err(EditSessionError::Sync(err)) => Err(err),
                Err(err) => return Err(err.into()),
            };
            print_outcome(result)?;
        }
        Command::Delete { id } => {
            let result = orchestrator.delete(DeleteNoteRequest { id }).await;
            print_outcome(result)?;
        }
        Command::Fetch { url, out } => {
            let bytes = app.fetch_signed(&url).await?;
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("writing {}", out.display()))?;
            println!("{} bytes written to {}", bytes.len(), out.display());
        }
    }
    Ok(())
}

async fn read_upload(path: &Path) -> Result<AttachmentUpload> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?
        .to_string();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(AttachmentUpload { file_name, bytes })
}

async fn open_session(orchestrator: &SyncOrchestrator, id: NoteId) -> Result<EditSession> {
    let feed = orchestrator.refresh().await?;
    let note = feed
        .find(id)
        .cloned()
        .ok_or_else(|| anyhow!("note not found: {id}"))?;
    Ok(EditSession::open(note))
}

/// Prints a mutation result. A mutation that was applied but could not be
/// followed by a refresh is reported as saved with a stale feed.
fn print_outcome(result: Result<MutationReport, SyncError>) -> Result<()> {
    match result {
        Ok(report) => {
            warn_failed_upload(report.note_id, &report.attachment);
            match &report.note {
                Some(note) => println!("{}", serde_json::to_string_pretty(note)?),
                None => println!("{}", report.note_id),
            }
            Ok(())
        }
        Err(SyncError::Refresh {
            note_id,
            attachment,
            source,
        }) => {
            warn_failed_upload(note_id, &attachment);
            warn!("event=cli_report module=cli status=stale note_id={note_id} error={source}");
            eprintln!("warning: note {note_id} saved but the feed could not be refreshed: {source}");
            println!("{note_id}");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn warn_failed_upload(note_id: NoteId, attachment: &AttachmentOutcome) {
    if let AttachmentOutcome::Failed { key, error } = attachment {
        warn!(
            "event=cli_report module=cli status=partial note_id={note_id} key={key} error={error}"
        );
        eprintln!("warning: note saved but image `{key}` was not uploaded: {error}");
    }
}

