//! CLI utilities.
//!
//! The utilities present in this module are used by `btrdb_cli` to read commands from a terminal.
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::command::{Command, CommandError};

#[derive(Debug, Error)]
pub enum PromptError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
}

/// Prompt user for a valid command. End of input counts as `.exit`.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, PromptError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }

    Ok(Command::try_from(s.as_str())?)
}
