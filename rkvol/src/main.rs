mod cli;
mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use libvolume::backend::RbdBackend;
use libvolume::{ManagerConfig, VolumeClient, VolumeManager, VolumeServer};
use tracing::{info, warn};

use cli::{Cli, Command, ServeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(&cli.socket, &args).await,
        command => run_client(VolumeClient::new(&cli.socket), command).await,
    }
}

async fn serve(socket: &Path, args: &ServeArgs) -> Result<()> {
    let config = ManagerConfig::from(args);
    info!(
        root = %config.root.display(),
        pool = %config.pool,
        size_mb = config.size.size_mb,
        fs_type = %config.fs_type,
        "starting rbd volume plugin",
    );

    let mut backend = RbdBackend::new(config.pool.clone());
    if let Some(conf) = &args.ceph_conf {
        backend = backend.with_conf(conf);
    }
    if let Some(id) = &args.ceph_id {
        backend = backend.with_id(id);
    }

    let manager = Arc::new(VolumeManager::ceph(config, backend));
    if args.recover {
        match manager.recover().await {
            Ok(count) => info!(count, "mount table recovered"),
            Err(e) => warn!(error = %e, "mount table recovery failed, starting empty"),
        }
    }

    let server = VolumeServer::bind(socket, Arc::clone(&manager))
        .with_context(|| format!("failed to listen on {}", socket.display()))?;
    server
        .serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to wait for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    let remaining = manager.records().await;
    if !remaining.is_empty() {
        warn!(
            mounts = %serde_json::to_string(&remaining)?,
            "exiting with volumes still mounted",
        );
    }
    Ok(())
}

async fn run_client(client: VolumeClient, command: Command) -> Result<()> {
    match command {
        Command::Create { name } => client
            .create(&name)
            .await
            .with_context(|| format!("create {name}"))?,
        Command::Remove { name } => client
            .remove(&name)
            .await
            .with_context(|| format!("remove {name}"))?,
        Command::Path { name } => {
            let path = client
                .path(&name)
                .await
                .with_context(|| format!("path {name}"))?;
            println!("{}", path.display());
        }
        Command::Mount { name } => {
            let path = client
                .mount(&name)
                .await
                .with_context(|| format!("mount {name}"))?;
            println!("{}", path.display());
        }
        Command::Unmount { name } => client
            .unmount(&name)
            .await
            .with_context(|| format!("unmount {name}"))?,
        Command::Serve(_) => unreachable!("serve is handled by main"),
    }
    Ok(())
}
