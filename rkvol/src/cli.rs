//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use libvolume::config::{DEFAULT_FS_TYPE, DEFAULT_POOL, DEFAULT_ROOT};
use libvolume::{ManagerConfig, SizePolicy};

/// Socket the container engine discovers volume plugins through.
pub const DEFAULT_SOCKET: &str = "/usr/share/docker/plugins/ceph.sock";

/// Ceph RBD volume plugin
#[derive(Parser, Debug)]
#[command(name = "rkvol", version, about)]
pub struct Cli {
    /// Plugin socket path
    #[arg(long, global = true, default_value = DEFAULT_SOCKET)]
    pub socket: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the plugin daemon
    Serve(ServeArgs),
    /// Provision a volume through a running daemon
    Create { name: String },
    /// Delete a volume through a running daemon
    Remove { name: String },
    /// Print the mountpoint of a volume
    Path { name: String },
    /// Mount a volume and print its mountpoint
    Mount { name: String },
    /// Release one mount of a volume
    Unmount { name: String },
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Directory under which volumes are mounted
    #[arg(long, default_value = DEFAULT_ROOT)]
    pub root: PathBuf,

    /// Ceph pool to use for volumes
    #[arg(long, default_value = DEFAULT_POOL)]
    pub pool: String,

    /// Size in MiB of volumes created on demand
    #[arg(long, default_value_t = SizePolicy::default().size_mb)]
    pub size_mb: u64,

    /// Filesystem written onto new volumes
    #[arg(long, default_value = DEFAULT_FS_TYPE)]
    pub fs_type: String,

    /// Alternative ceph.conf passed to every rbd call
    #[arg(long)]
    pub ceph_conf: Option<PathBuf>,

    /// cephx user passed to every rbd call
    #[arg(long)]
    pub ceph_id: Option<String>,

    /// Rebuild the mount table from RBD mounts already under the root
    #[arg(long)]
    pub recover: bool,
}

impl From<&ServeArgs> for ManagerConfig {
    fn from(args: &ServeArgs) -> Self {
        Self {
            root: args.root.clone(),
            pool: args.pool.clone(),
            size: SizePolicy {
                size_mb: args.size_mb,
            },
            fs_type: args.fs_type.clone(),
        }
    }
}
