
use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use blockfs::{BlockStore, VolumeSession};
use clap::Parser;
use tracing::debug;

use crate::cli::{FsCommand, ShellCommand, ShellLine};
use crate::commands::execute;
use crate::mount::format_store;

const PROMPT: &str = "fs> ";

enum Flow {
    Continue,
    Exit,
}

/// Asks a yes/no question on `out`; anything but `y` or `yes` is a no, as is end of input.
pub fn confirm(question: &str, input: &mut impl BufRead, out: &mut impl Write) -> Result<bool> {
    write!(out, "{question} [y/N] ")?;
    out.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer).context("failed to read answer")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Reads commands from `input` until `exit` or end of input and hands the store back.
///
/// An unformatted volume is offered for formatting first; declining ends the shell.
pub fn run_shell<S: BlockStore>(
    store: S,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<Option<S>> {
    let formatted = VolumeSession::is_formatted(&store).context("failed to probe volume")?;
    let mut session = if formatted {
        VolumeSession::mount(store).context("failed to mount volume")?
    } else {
        writeln!(out, "volume is not formatted")?;
        match format_store(store, false, input, out)? {
            Some(session) => session,
            None => return Ok(None),
        }
    };

    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line).context("failed to read command")? == 0 {
            writeln!(out)?;
            break;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        let parsed = match ShellLine::try_parse_from(words) {
            Ok(parsed) => parsed,
            Err(err) => {
                write!(out, "{}", err.render())?;
                continue;
            }
        };
        debug!(command = ?parsed.command, "shell command");
        match run_command(&mut session, parsed.command, input, out) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(err) => writeln!(out, "error: {err:#}")?,
        }
    }
    Ok(Some(session.into_store()))
}

fn run_command<S: BlockStore>(
    session: &mut VolumeSession<S>,
    command: ShellCommand,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<Flow> {
    match command {
        ShellCommand::Fs(FsCommand::Format { yes }) => {
            if yes || confirm("format the volume, destroying its contents?", input, out)? {
                execute(session, &FsCommand::Format { yes }, out)?;
            } else {
                writeln!(out, "format cancelled")?;
            }
        }
        ShellCommand::Fs(command) => execute(session, &command, out)?,
        ShellCommand::Cd { name } => session
            .change_directory(&name)
            .with_context(|| format!("cd {name}"))?,
        ShellCommand::Pwd => writeln!(out, "{}", session.current_path())?,
        ShellCommand::Open { name } => {
            let fd = session.open(&name).with_context(|| format!("open {name}"))?;
            writeln!(out, "fd {fd}")?;
        }
        ShellCommand::Seek { fd, offset, whence } => {
            let position = session
                .seek(fd, offset, whence.into())
                .with_context(|| format!("seek {fd}"))?;
            writeln!(out, "position {position}")?;
        }
        ShellCommand::Read { fd, len } => {
            let data = session.read(fd, len).with_context(|| format!("read {fd}"))?;
            out.write_all(&data)?;
            writeln!(out)?;
        }
        ShellCommand::Write { fd, text } => {
            let written = session
                .write(fd, text.join(" ").as_bytes())
                .with_context(|| format!("write {fd}"))?;
            writeln!(out, "wrote {written} bytes")?;
        }
        ShellCommand::Close { fd } => session.close(fd).with_context(|| format!("close {fd}"))?,
        ShellCommand::Exit => return Ok(Flow::Exit),
    }
    Ok(Flow::Continue)
}
