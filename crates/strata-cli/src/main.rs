//! strata: inspect and edit overlay filesystems from the command line.
//!
//! Mounts come from the config file (`$XDG_CONFIG_HOME/strata/config.toml`)
//! plus any `--mount` flags, applied in that order so flags win.
//!
//! ```bash
//! strata --mount /srv/base --mount /srv/patches=/docs ls /docs
//! strata --mount /srv/base --writer /srv/out write /notes.txt < notes.txt
//! strata --writer /srv/out copy /srv/archive
//! ```
//!
//! Logging goes to stderr; set `STRATA_LOG` (or `RUST_LOG`) to adjust.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strata_vfs::config::{MountConfig, WriterConfig, WriterKind};
use strata_vfs::StrataConfig;

/// Overlay virtual filesystem tool.
#[derive(Parser, Debug)]
#[command(name = "strata", version)]
#[command(about = "Inspect and edit overlay virtual filesystems")]
struct Args {
    /// Config file (defaults to $XDG_CONFIG_HOME/strata/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Extra mount, as PHYSICAL or PHYSICAL=LOCATION (repeatable)
    #[arg(short, long = "mount", global = true)]
    mounts: Vec<String>,

    /// Folder write area, mounted over everything else
    #[arg(short, long, global = true, conflicts_with = "ram_writer")]
    writer: Option<PathBuf>,

    /// Ram disk write area (contents are lost on exit)
    #[arg(long, global = true)]
    ram_writer: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List active mount points
    Mounts {
        #[arg(long)]
        json: bool,
    },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Show owner, size and modification time
        #[arg(short, long)]
        long: bool,
        #[arg(long)]
        json: bool,
    },
    /// Find files (or directories) by mask
    Find {
        /// Mask with `*` and `?`
        mask: String,
        #[arg(short, long, default_value = "/")]
        path: String,
        /// Search directories instead of files
        #[arg(short, long)]
        dirs: bool,
        /// Only look at direct children
        #[arg(long)]
        no_recurse: bool,
    },
    /// Print a file
    Cat { path: String },
    /// Create a directory (and parents)
    Mkdir { path: String },
    /// Delete files
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Delete a directory and everything below it
    Rmdir { path: String },
    /// Rename a file or directory in place
    Mv { path: String, new_name: String },
    /// Write stdin to a file
    Write {
        path: String,
        /// Append instead of replacing
        #[arg(short, long)]
        append: bool,
        /// Fail if the file already exists
        #[arg(long, conflicts_with = "append")]
        new: bool,
    },
    /// Copy a whole physical source into the write area (Ctrl-C cancels)
    Copy {
        /// OS directory to copy from
        source: String,
        #[arg(long)]
        overwrite: bool,
    },
}

/// Parse `PHYSICAL` or `PHYSICAL=LOCATION`.
fn parse_mount(arg: &str) -> MountConfig {
    match arg.rsplit_once('=') {
        Some((physical, at)) if !physical.is_empty() && at.starts_with('/') => MountConfig {
            physical: physical.to_string(),
            at: at.to_string(),
        },
        _ => MountConfig {
            physical: arg.to_string(),
            at: "/".to_string(),
        },
    }
}

fn load_config(args: &Args) -> Result<StrataConfig> {
    let mut config = match &args.config {
        Some(path) => StrataConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StrataConfig::load_default().context("Failed to load default config")?,
    };

    config.mounts.extend(args.mounts.iter().map(String::as_str).map(parse_mount));
    if let Some(dir) = &args.writer {
        config.writer = Some(WriterConfig {
            kind: WriterKind::Folder,
            path: Some(dir.to_string_lossy().into_owned()),
        });
    } else if let Some(name) = &args.ram_writer {
        config.writer = Some(WriterConfig {
            kind: WriterKind::RamDisk,
            path: Some(name.clone()),
        });
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("STRATA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("strata=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let (fs, writer) = config.build().context("Failed to assemble filesystem")?;
    tracing::debug!(mounts = fs.mount_points().len(), "filesystem ready");

    commands::run(args.command, fs, writer).await
}
