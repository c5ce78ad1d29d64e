use std::path::PathBuf;

use blockfs::Whence;
use blockfs::constants::{DEFAULT_BLOCK_SIZE, DEFAULT_VOLUME_SIZE};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "blockfs", author, version, about = "Block filesystem on a host image file")]
pub struct Cli {
    #[command(flatten)]
    pub volume: VolumeArgs,

    /// Log every block transfer at debug level.
    #[arg(long, env = "BLOCKFS_TRACE_IO")]
    pub trace_io: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct VolumeArgs {
    /// Host file holding the volume; created when missing.
    #[arg(long, env = "BLOCKFS_IMAGE", default_value = "blockfs.img")]
    pub image: PathBuf,

    #[arg(long, env = "BLOCKFS_VOLUME_SIZE", default_value_t = DEFAULT_VOLUME_SIZE)]
    pub volume_size: u64,

    #[arg(long, env = "BLOCKFS_BLOCK_SIZE", default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: u64,

    #[arg(long, env = "BLOCKFS_VOLUME_NAME", default_value = "blockfs")]
    pub volume_name: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(flatten)]
    Fs(FsCommand),

    /// Interactive prompt over the volume.
    Shell,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum FsCommand {
    /// Format the volume, destroying its contents.
    Format {
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
    /// Show volume geometry and usage.
    Lsfs,
    /// List the current directory.
    Ls,
    Mkdir { name: String },
    Rmdir { name: String },
    Cp { src: String, dst: String },
    /// Rename, or move into a directory (`/` and `..` included).
    Mv { src: String, dst: String },
    Del { name: String },
    /// Copy a host file into the volume.
    Cpin { host: PathBuf, name: String },
    /// Copy a file out of the volume to the host.
    Cpout { name: String, host: PathBuf },
    /// Print a file.
    Cat { name: String },
}

/// One line typed at the shell prompt.
#[derive(Parser, Debug)]
#[command(name = "fs", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    #[command(flatten)]
    Fs(FsCommand),
    Cd { name: String },
    Pwd,
    /// Open (creating if needed) a file and print its descriptor.
    Open { name: String },
    Seek {
        fd: usize,
        #[arg(allow_negative_numbers = true)]
        offset: i64,
        #[arg(value_enum, default_value_t = WhenceArg::Abs)]
        whence: WhenceArg,
    },
    Read { fd: usize, len: usize },
    /// Write the remaining words, space separated.
    Write {
        fd: usize,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    Close { fd: usize },
    #[command(alias = "quit")]
    Exit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum WhenceArg {
    Cur,
    Abs,
    End,
}

impl From<WhenceArg> for Whence {
    fn from(arg: WhenceArg) -> Self {
        match arg {
            WhenceArg::Cur => Self::Cur,
            WhenceArg::Abs => Self::Abs,
            WhenceArg::End => Self::End,
        }
    }
}
