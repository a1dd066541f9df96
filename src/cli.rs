use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wslswitch", about = "Fetch, extract, and switch WSL1 Linux rootfs installations")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract a rootfs and switch it in as the active installation
    Install {
        /// `image[:tag]`, a tarball path, or a SquashFS path
        target: String,

        /// Skip post-install shell hooks
        #[arg(long)]
        no_hooks: bool,
    },

    /// Swap back to a previously backed-up rootfs by label
    Switch {
        /// `image[:tag]` naming an already-installed `rootfs_<label>` slot
        target: String,
    },

    /// Fetch a rootfs archive into the working directory without installing it
    Get {
        /// `image[:tag]`
        target: String,

        /// Destination directory (defaults to the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
