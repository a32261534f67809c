use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::Colorize;
use radblob_archive::ArchiveBlobManager;
use radblob_store::{compute_id, BlobFlags, BlobManager, LooseFileBlobManager, MultiBlobManager};
use serde_json::json;

use crate::cli::*;
use crate::config::CliConfig;

pub fn run_command(cli: Cli, config: &CliConfig) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Ls(args) => cmd_ls(args, config, format),
        Command::Get(args) => cmd_get(args, config),
        Command::Put(args) => cmd_put(args, config, format),
        Command::Pack(args) => cmd_pack(args, config),
        Command::Unpack(args) => cmd_unpack(args, config),
        Command::Id(args) => cmd_id(args, format),
        Command::Info(args) => cmd_info(args, config, format),
    }
}

/// Backend a store path on the command line refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    LooseFile,
    Archive,
}

/// Existing directories and paths ending in a separator are loose-file
/// stores; anything else is an archive file.
pub fn store_kind(path: &Path) -> StoreKind {
    let text = path.as_os_str().to_string_lossy();
    if path.is_dir() || text.ends_with('/') || text.ends_with(std::path::MAIN_SEPARATOR) {
        StoreKind::LooseFile
    } else {
        StoreKind::Archive
    }
}

fn open_store(path: &Path, flags: BlobFlags, config: &CliConfig) -> anyhow::Result<Box<dyn BlobManager>> {
    let store: Box<dyn BlobManager> = match store_kind(path) {
        StoreKind::LooseFile => {
            let mut mgr = LooseFileBlobManager::with_config(config.store.clone());
            mgr.init(flags, path)?;
            Box::new(mgr)
        }
        StoreKind::Archive => {
            let mut mgr = ArchiveBlobManager::with_config(config.archive.clone());
            mgr.init_file(flags, path, 0, 0)?;
            Box::new(mgr)
        }
    };
    tracing::debug!(path = %path.display(), kind = %store.kind(), %flags, "opened store");
    Ok(store)
}

fn open_read_only(paths: &[PathBuf], config: &CliConfig) -> anyhow::Result<Vec<Box<dyn BlobManager>>> {
    paths
        .iter()
        .map(|path| {
            open_store(path, BlobFlags::READABLE, config)
                .with_context(|| format!("opening store {}", path.display()))
        })
        .collect()
}

fn cascade<'a>(stores: &'a [Box<dyn BlobManager>]) -> anyhow::Result<MultiBlobManager<'a>> {
    let mut multi = MultiBlobManager::new();
    multi.init(BlobFlags::READABLE)?;
    for store in stores {
        multi.add_blob_manager(store.as_ref())?;
    }
    Ok(multi)
}

fn cmd_ls(args: LsArgs, config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let stores = open_read_only(&args.stores, config)?;
    let multi = cascade(&stores)?;
    let ids = multi.enumerate();

    match format {
        OutputFormat::Json => {
            let blobs: Vec<_> = ids
                .iter()
                .map(|id| json!({ "id": id, "size": multi.get_size(id) }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&blobs)?);
        }
        OutputFormat::Text => {
            for id in &ids {
                println!("{}  {}", id.yellow(), multi.get_size(id).to_string().dimmed());
            }
            println!("{} blobs in {} stores", ids.len().to_string().bold(), stores.len());
        }
    }
    Ok(())
}

fn cmd_get(args: GetArgs, config: &CliConfig) -> anyhow::Result<()> {
    let stores = open_read_only(&args.stores, config)?;
    let multi = cascade(&stores)?;
    if !multi.does_exist(&args.id) {
        anyhow::bail!("blob {} not found in any store", args.id);
    }
    let data = multi.get(&args.id)?;

    match args.output {
        Some(path) => {
            fs::write(&path, &data).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} Wrote {} bytes to {}", "✓".green().bold(), data.len(), path.display());
        }
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(&data)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn cmd_put(args: PutArgs, config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mut store = open_store(
        &args.store,
        BlobFlags::READ_WRITE | BlobFlags::OPEN_EXISTING_OR_CREATE_NEW,
        config,
    )
    .with_context(|| format!("opening store {}", args.store.display()))?;

    let mut added = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let mut file = File::open(path).with_context(|| format!("reading {}", path.display()))?;
        let id = store
            .add_stream_compute_unique_id(&mut file, &args.prefix, &args.ext, None)
            .with_context(|| format!("adding {}", path.display()))?;
        added.push((path, id));
    }
    store.deinit()?;

    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = added
                .iter()
                .map(|(path, id)| json!({ "file": path, "id": id }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            for (path, id) in &added {
                println!("  {} {} {}", "added:".green(), id.yellow(), path.display());
            }
        }
    }
    Ok(())
}

fn cmd_pack(args: PackArgs, config: &CliConfig) -> anyhow::Result<()> {
    let mut source = LooseFileBlobManager::with_config(config.store.clone());
    source
        .init(BlobFlags::READABLE, &args.dir)
        .with_context(|| format!("opening {}", args.dir.display()))?;

    let mut archive = ArchiveBlobManager::with_config(config.archive.clone());
    archive
        .init_file(BlobFlags::WRITABLE, &args.archive, 0, 0)
        .with_context(|| format!("creating {}", args.archive.display()))?;
    archive.populate(&source)?;
    let count = archive.enumerate().len();
    archive.deinit()?;

    println!(
        "{} Packed {} blobs into {}",
        "✓".green().bold(),
        count.to_string().bold(),
        args.archive.display()
    );
    Ok(())
}

fn cmd_unpack(args: UnpackArgs, config: &CliConfig) -> anyhow::Result<()> {
    let mut archive = ArchiveBlobManager::with_config(config.archive.clone());
    archive
        .init_file(BlobFlags::READABLE, &args.archive, 0, 0)
        .with_context(|| format!("opening {}", args.archive.display()))?;

    let mut target = LooseFileBlobManager::with_config(config.store.clone());
    target.init(BlobFlags::READ_WRITE, &args.dir)?;
    target.populate(&archive)?;

    println!(
        "{} Unpacked {} blobs into {}",
        "✓".green().bold(),
        archive.enumerate().len().to_string().bold(),
        args.dir.display()
    );
    Ok(())
}

fn cmd_id(args: IdArgs, format: OutputFormat) -> anyhow::Result<()> {
    let data = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let id = compute_id(&data, &args.prefix, &args.ext, None)?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "file": args.file, "id": id })),
        OutputFormat::Text => println!("{id}"),
    }
    Ok(())
}

fn cmd_info(args: InfoArgs, config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mut archive = ArchiveBlobManager::with_config(config.archive.clone());
    archive
        .init_file(BlobFlags::READABLE, &args.archive, 0, 0)
        .with_context(|| format!("opening {}", args.archive.display()))?;

    let ids = archive.enumerate();
    let payload: u64 = ids.iter().map(|id| archive.get_size(id)).sum();
    let size = archive.get_archive_size()?;

    match format {
        OutputFormat::Json => {
            let info = json!({
                "archive": args.archive,
                "blobs": ids.len(),
                "payload_bytes": payload,
                "archive_bytes": size,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        OutputFormat::Text => {
            println!("Archive {}", args.archive.display().to_string().bold());
            println!("  Blobs:   {}", ids.len().to_string().yellow());
            println!("  Payload: {} bytes", payload);
            println!("  On disk: {} bytes", size);
        }
    }
    Ok(())
}
