mod cli;
mod commands;
mod io_trace;
mod mount;
mod shell;

use std::io;

use blockfs::VolumeSession;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, FsCommand};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    if cli.trace_io {
        filter = filter.add_directive(format!("{}=debug", io_trace::TARGET).parse()?);
    }
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();
    if cli.trace_io {
        io_trace::install();
    }

    let store = mount::open_store(&cli.volume)?;
    let mut input = io::stdin().lock();
    let mut out = io::stdout().lock();
    let store = match cli.command {
        Command::Shell => shell::run_shell(store, &mut input, &mut out)?,
        Command::Fs(FsCommand::Format { yes }) => {
            mount::format_store(store, yes, &mut input, &mut out)?.map(VolumeSession::into_store)
        }
        Command::Fs(command) => {
            let mut session = mount::mount_session(store)?;
            commands::execute(&mut session, &command, &mut out)?;
            Some(session.into_store())
        }
    };
    if let Some(store) = store {
        store.flush()?;
        debug!(image = %store.path().display(), "flushed volume image");
    }
    Ok(())
}
