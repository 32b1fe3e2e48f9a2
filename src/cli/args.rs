//! Command-line argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Browse and transfer files on MTP devices
#[derive(Parser, Debug)]
#[command(name = "mtp-access", version, about)]
pub struct Args {
    /// Path to a config file (default: the per-user config location)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Chunk size in bytes for transfers
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List attached MTP devices
    Devices,

    /// Print the directory tree of a device (or of one path on it)
    Tree {
        /// Device selector: index, label or id prefix
        device: String,
        /// Virtual path to start from (default: the whole device)
        path: Option<String>,
    },

    /// Copy a file from the device to the local filesystem
    Pull {
        /// Device selector: index, label or id prefix
        device: String,
        /// Virtual path of the file on the device
        remote: String,
        /// Local destination file (default: the file name in the
        /// current directory)
        local: Option<PathBuf>,
    },

    /// Copy a local file onto the device
    Push {
        /// Device selector: index, label or id prefix
        device: String,
        /// Local source file
        local: PathBuf,
        /// Virtual path of the destination folder on the device
        remote_dir: String,
    },

    /// Create a directory path on the device
    Mkdir {
        /// Device selector: index, label or id prefix
        device: String,
        /// Virtual path to create
        path: String,
    },

    /// Delete a file or folder (recursively) on the device
    Rm {
        /// Device selector: index, label or id prefix
        device: String,
        /// Virtual path to delete
        path: String,
    },
}
