#[cfg(test)]
mod commands_tests;

use std::io::Write;

use anyhow::{Context, Result};
use blockfs::layout::InodeKind;
use blockfs::{BlockStore, TransferReport, VolumeSession};

use crate::cli::FsCommand;

/// Runs one filesystem command against `session`, printing results to `out`.
///
/// `format` is carried out without asking; callers confirm first.
pub fn execute<S: BlockStore>(
    session: &mut VolumeSession<S>,
    command: &FsCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        FsCommand::Format { .. } => {
            session.reformat().context("failed to format volume")?;
            writeln!(out, "volume formatted")?;
        }
        FsCommand::Lsfs => print_volume_info(session, out)?,
        FsCommand::Ls => {
            let listing = session.list_directory().context("ls")?;
            for row in &listing {
                let kind = match row.kind {
                    InodeKind::Directory => "dir",
                    _ => "file",
                };
                writeln!(
                    out,
                    "{kind:<4} {:>10} {:>12} {}",
                    row.size, row.modified, row.name
                )?;
            }
            writeln!(out, "{} entries", listing.len())?;
        }
        FsCommand::Mkdir { name } => {
            session
                .make_directory(name)
                .with_context(|| format!("mkdir {name}"))?;
        }
        FsCommand::Rmdir { name } => {
            session
                .remove_directory(name)
                .with_context(|| format!("rmdir {name}"))?;
        }
        FsCommand::Cp { src, dst } => {
            let bytes = session
                .copy_file(src, dst)
                .with_context(|| format!("cp {src} {dst}"))?;
            writeln!(out, "copied {bytes} bytes")?;
        }
        FsCommand::Mv { src, dst } => {
            session
                .move_file(src, dst)
                .with_context(|| format!("mv {src} {dst}"))?;
        }
        FsCommand::Del { name } => {
            session
                .delete_file(name)
                .with_context(|| format!("del {name}"))?;
        }
        FsCommand::Cpin { host, name } => {
            let report = session
                .import_from_host(host, name)
                .with_context(|| format!("cpin {} {name}", host.display()))?;
            print_report(out, "imported", &report)?;
        }
        FsCommand::Cpout { name, host } => {
            let report = session
                .export_to_host(name, host)
                .with_context(|| format!("cpout {name} {}", host.display()))?;
            print_report(out, "exported", &report)?;
        }
        FsCommand::Cat { name } => {
            let data = session
                .read_file(name)
                .with_context(|| format!("cat {name}"))?;
            out.write_all(&data)?;
            if !data.ends_with(b"\n") {
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

fn print_volume_info<S: BlockStore>(
    session: &VolumeSession<S>,
    out: &mut impl Write,
) -> Result<()> {
    let info = session.volume_info();
    writeln!(out, "volume name:       {}", info.volume_name)?;
    writeln!(out, "volume size:       {}", info.volume_size)?;
    writeln!(out, "block size:        {}", info.block_size)?;
    writeln!(out, "block count:       {}", info.block_count)?;
    writeln!(out, "inodes:            {} / {}", info.used_inodes, info.num_inodes)?;
    writeln!(
        out,
        "data blocks:       {} used, {} free, {} total",
        info.used_blocks, info.free_blocks, info.total_data_blocks
    )?;
    writeln!(out, "inode table at:    {}", info.inode_start)?;
    writeln!(out, "bitmap at:         {}", info.bitmap_start)?;
    writeln!(out, "data at:           {}", info.data_start)?;
    writeln!(out, "max file size:     {}", info.max_file_size)?;
    Ok(())
}

fn print_report(out: &mut impl Write, verb: &str, report: &TransferReport) -> Result<()> {
    writeln!(
        out,
        "{verb} {} bytes sha256 {}",
        report.bytes,
        report.checksum_hex()
    )?;
    Ok(())
}
