//! vmount binary
//!
//! Browse exploded archive trees with automount-on-access.
//!
//! ## Usage
//!
//! ```bash
//! # List a directory, mounting archives on the way
//! vmount --root /srv/deploy ls app.ear/web.war/WEB-INF/lib
//!
//! # Print a file nested inside archives
//! vmount --root /srv/deploy cat outer.jar/jar1.jar/META-INF/MANIFEST.MF
//!
//! # Mount archives (optionally as temp copies) and dump the mount table
//! vmount --root /srv/deploy mounts --copy app.ear lib/util.jar
//! ```
//!
//! Every mount made by a command is cleaned up before exit.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vmount_kernel::{
    AutomountConfig, Automounter, CleanupReport, MemoryBackend, VirtualFileSystem, install,
};
use vmount_types::MountOptions;

/// Automount-on-access browser for archive trees.
#[derive(Parser, Debug)]
#[command(name = "vmount")]
#[command(about = "Browse nested archives, mounting them on access")]
struct Args {
    /// RON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory the virtual hierarchy is anchored at
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Track mounts without touching the disk
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the children of a path
    Ls {
        #[arg(default_value = "")]
        path: String,
    },
    /// Write a file's contents to stdout
    Cat { path: String },
    /// Mount each path and print the mount table as JSON
    Mounts {
        /// Mount as independent temp copies
        #[arg(long)]
        copy: bool,

        paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(report) => {
            for failure in &report.failures {
                eprintln!("warning: failed to release {}: {}", failure.target, failure.error);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AutomountConfig> {
    let config = match path {
        Some(path) => AutomountConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AutomountConfig::default(),
    };
    Ok(config.with_env_overrides())
}

async fn run(args: Args) -> Result<CleanupReport> {
    let config = load_config(args.config.as_ref())?;
    let automounter = if args.dry_run {
        Automounter::new(Arc::new(MemoryBackend::new()), config)
    } else {
        Automounter::local(config)
    };
    let automounter = Arc::new(automounter);
    install(Arc::clone(&automounter))?;
    tracing::debug!(backend = automounter.backend_name(), root = %args.root.display(), "starting");

    let vfs = VirtualFileSystem::new(automounter, &args.root)
        .with_context(|| format!("opening {}", args.root.display()))?;

    let outcome = execute(&vfs, args.command).await;
    // Cleaning up the root cascades into every mount made beneath it.
    let report = vfs.close(vfs.root()).await;
    outcome.map(|()| report)
}

async fn execute(vfs: &VirtualFileSystem, command: Command) -> Result<()> {
    match command {
        Command::Ls { path } => {
            let dir = vfs.find_child(vfs.root(), &path).await?;
            let children = vfs.children(&dir).await?;
            let mut stdout = std::io::stdout().lock();
            for child in children {
                let marker = if vfs.is_archive(&child) { "!" } else { "" };
                writeln!(stdout, "{}{marker}", child.name())?;
            }
        }
        Command::Cat { path } => {
            let file = vfs.find_child(vfs.root(), &path).await?;
            let bytes = vfs.read(&file).await?;
            std::io::stdout().write_all(&bytes)?;
        }
        Command::Mounts { copy, paths } => {
            let options = if copy {
                MountOptions::copy()
            } else {
                MountOptions::empty()
            };
            let automounter = vfs.automounter();
            for path in &paths {
                let file = vfs.find_child(vfs.root(), path).await?;
                automounter
                    .mount_with_options(&file, options)
                    .await
                    .with_context(|| format!("mounting {path}"))?;
            }
            let table = serde_json::to_string_pretty(&automounter.list_mounts())?;
            println!("{table}");
        }
    }
    Ok(())
}
