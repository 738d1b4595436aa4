use clap::{Parser, Subcommand};
use pennynote_core::NoteId;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "pennynote.toml";

#[derive(Clone, Debug, Eq, Parser, PartialEq)]
#[command(version, about)]
pub struct CliConfig {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Identity whose notes are read and written.
    #[arg(long)]
    pub owner: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Eq, PartialEq, Subcommand)]
pub enum Command {
    /// Print the resolved feed as JSON.
    List,
    /// Create a note, optionally with a png/jpeg image.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Replace a note's name and description; its image is kept.
    Update {
        #[arg(long, value_parser = parse_note_id)]
        id: NoteId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
    },
    Delete {
        #[arg(long, value_parser = parse_note_id)]
        id: NoteId,
    },
    /// Verify a signed media URL and save the blob it points to.
    Fetch {
        #[arg(long)]
        url: String,
        #[arg(long)]
        out: PathBuf,
    },
}

fn parse_note_id(value: &str) -> Result<NoteId, String> {
    NoteId::parse(value).ok_or_else(|| format!("`{value}` is not a note id"))
}
