//! Subcommand implementations.

use std::io::{self, Read, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use strata_vfs::{FileSystem, FileSystemWriter, OpenMode, VirtualDirectory, VirtualFile};

use crate::Command;

pub async fn run(command: Command, fs: Arc<FileSystem>, writer: Option<FileSystemWriter>) -> Result<()> {
    match command {
        Command::Mounts { json } => mounts(&fs, json),
        Command::Ls { path, long, json } => ls(&fs, &path, long, json),
        Command::Find {
            mask,
            path,
            dirs,
            no_recurse,
        } => find(&fs, &mask, &path, dirs, !no_recurse),
        Command::Cat { path } => {
            let data = fs.read_file(&path).with_context(|| format!("cat {path}"))?;
            io::stdout().write_all(&data)?;
            Ok(())
        }
        Command::Mkdir { path } => {
            let dir = require(writer.as_ref())?
                .create_directory(&path)
                .with_context(|| format!("mkdir {path}"))?;
            println!("{}", dir.full_path);
            Ok(())
        }
        Command::Rm { paths } => {
            let deleted = require(writer.as_ref())?
                .delete_files(&paths)
                .context("rm")?;
            for file in deleted {
                println!("{}", file.full_path);
            }
            Ok(())
        }
        Command::Rmdir { path } => {
            let removed = require(writer.as_ref())?
                .delete_directory(&path)
                .with_context(|| format!("rmdir {path}"))?;
            tracing::info!(directories = removed.len(), "removed");
            Ok(())
        }
        Command::Mv { path, new_name } => mv(require(writer.as_ref())?, &fs, &path, &new_name),
        Command::Write { path, append, new } => {
            let mode = if append {
                OpenMode::Append
            } else if new {
                OpenMode::CreateNew
            } else {
                OpenMode::Create
            };
            write(require(writer.as_ref())?, &path, mode)
        }
        Command::Copy { source, overwrite } => {
            let writer = Arc::new(writer.context("copy needs a write area (--writer or [writer] in config)")?);
            copy(writer, &source, overwrite).await
        }
    }
}

fn require(writer: Option<&FileSystemWriter>) -> Result<&FileSystemWriter> {
    match writer {
        Some(writer) => Ok(writer),
        None => bail!("this command needs a write area (--writer or [writer] in config)"),
    }
}

fn mounts(fs: &FileSystem, as_json: bool) -> Result<()> {
    let mounts = fs.mount_points();
    if as_json {
        let list: Vec<_> = mounts
            .iter()
            .map(|m| {
                json!({
                    "provider": m.provider().name(),
                    "description": m.provider().description(),
                    "physical": m.physical_path(),
                    "location": m.mount_location(),
                    "fake": m.is_fake_mount(),
                    "read_only": m.provider().is_read_only(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    for (i, mount) in mounts.iter().enumerate() {
        println!("{i:>3}  {mount}");
    }
    Ok(())
}

fn format_time(file: &VirtualFile) -> String {
    file.last_modified()
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn ls(fs: &FileSystem, path: &str, long: bool, as_json: bool) -> Result<()> {
    let (dirs, files) = fs
        .directory_children(path)
        .with_context(|| format!("ls {path}"))?;

    if as_json {
        let entries: Vec<_> = dirs
            .iter()
            .map(|d| json!({"type": "directory", "path": d.full_path, "owner": d.mount_point.to_string()}))
            .chain(files.iter().map(|f| {
                json!({
                    "type": "file",
                    "path": f.full_path,
                    "size": f.size(),
                    "owner": f.mount_point.to_string(),
                    "modified": f.last_modified().map(|t| DateTime::<Local>::from(t).to_rfc3339()),
                })
            }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for dir in &dirs {
        if long {
            println!("{:>10}  {:16}  {}/  [{}]", "-", "", dir.name, dir.mount_point);
        } else {
            println!("{}/", dir.name);
        }
    }
    for file in &files {
        if long {
            println!(
                "{:>10}  {:16}  {}  [{}]",
                file.size(),
                format_time(file),
                file.name,
                file.mount_point
            );
        } else {
            println!("{}", file.name);
        }
    }
    Ok(())
}

fn find(fs: &FileSystem, mask: &str, path: &str, dirs: bool, recursive: bool) -> Result<()> {
    if dirs {
        let found: Vec<VirtualDirectory> = fs
            .find_directories(path, mask, recursive)
            .with_context(|| format!("find {mask} in {path}"))?;
        for dir in found {
            println!("{}", dir.full_path);
        }
    } else {
        let found = fs
            .find_files(path, mask, recursive)
            .with_context(|| format!("find {mask} in {path}"))?;
        for file in found {
            println!("{}", file.full_path);
        }
    }
    Ok(())
}

fn mv(writer: &FileSystemWriter, fs: &FileSystem, path: &str, new_name: &str) -> Result<()> {
    let new_path = if fs.get_file(path).ok().flatten().is_some() {
        writer.rename_file(path, new_name)?.full_path
    } else {
        writer
            .rename_directory(path, new_name)
            .with_context(|| format!("mv {path}"))?
            .full_path
    };
    println!("{new_path}");
    Ok(())
}

fn write(writer: &FileSystemWriter, path: &str, mode: OpenMode) -> Result<()> {
    let mut input = Vec::new();
    io::stdin().read_to_end(&mut input).context("reading stdin")?;

    let mut stream = writer
        .open_stream(path, mode)
        .with_context(|| format!("open {path}"))?;
    stream.write_all(&input)?;
    let file = stream.close()?;
    tracing::info!(path = %file.full_path, size = file.size(), "written");
    Ok(())
}

async fn copy(writer: Arc<FileSystemWriter>, source: &str, overwrite: bool) -> Result<()> {
    let from = Arc::new(FileSystem::new());
    from.mount(source, "/")
        .with_context(|| format!("mount {source}"))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping copy");
            on_signal.cancel();
        }
    });

    let result = writer
        .copy_from_async(from, cancel, overwrite, |p| {
            eprint!("\r{}/{} files", p.files_copied, p.total_files);
            true
        })
        .await;
    eprintln!();

    match result.context("copy failed")? {
        Some(count) => println!("copied {} directories, {} files", count.directories, count.files),
        None => println!("copy cancelled"),
    }
    Ok(())
}
