//! xvarc CLI - Command-line tool for EARC archive listing and extraction.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::{MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use xvarc_earc::{Archive, Entry};

/// xvarc - Luminous engine EARC archive tool
#[derive(Parser)]
#[command(name = "xvarc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the archive header
    Info {
        /// Path to the EARC file
        #[arg(short, long, env = "INPUT_EARC")]
        archive: PathBuf,
    },

    /// List contents of an EARC archive
    List {
        /// Path to the EARC file
        #[arg(short, long, env = "INPUT_EARC")]
        archive: PathBuf,

        /// Filter pattern (glob-style, matched against the entry path)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,

        /// Print entries as JSON
        #[arg(long, conflicts_with = "detailed")]
        json: bool,
    },

    /// Extract files from an EARC archive
    Extract {
        /// Path to the EARC file
        #[arg(short, long, env = "INPUT_EARC")]
        archive: PathBuf,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        /// Filter pattern (glob-style, matched against the entry path)
        #[arg(short, long)]
        filter: Option<String>,

        /// Cut decrypted payloads to their declared size
        #[arg(short, long)]
        trim: bool,

        /// Extract entries on all cores
        #[arg(short, long)]
        parallel: bool,
    },
}

/// One row of `list --json`.
#[derive(Serialize)]
struct EntryRow<'a> {
    index: usize,
    name: &'a str,
    path: &'a str,
    hash: String,
    size: u32,
    compressed_size: u32,
    offset: u64,
    flags: String,
    localize_type: u8,
    localize_locale: u8,
}

impl<'a> From<&'a Entry> for EntryRow<'a> {
    fn from(entry: &'a Entry) -> Self {
        Self {
            index: entry.index(),
            name: entry.name(),
            path: entry.path(),
            hash: format!("{:016x}", entry.hash()),
            size: entry.size(),
            compressed_size: entry.compressed_size(),
            offset: entry.offset_data(),
            flags: entry.flags().to_string(),
            localize_type: entry.localize_type(),
            localize_locale: entry.localize_locale(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Info { archive } => {
            cmd_info(&archive)?;
        }
        Commands::List {
            archive,
            filter,
            detailed,
            json,
        } => {
            cmd_list(&archive, filter.as_deref(), detailed, json)?;
        }
        Commands::Extract {
            archive,
            output,
            filter,
            trim,
            parallel,
        } => {
            cmd_extract(&archive, &output, filter.as_deref(), trim, parallel)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(path: &Path) -> Result<Archive> {
    Archive::open(path).with_context(|| format!("Failed to open archive {}", path.display()))
}

fn cmd_info(path: &Path) -> Result<()> {
    let archive = open(path)?;
    let header = archive.header();

    println!("Archive:        {}", archive.name());
    println!("Version:        {}.{}", header.major, header.minor);
    println!("Entries:        {}", header.count);
    println!("Flags:          {}", header.flags);
    println!("Block size:     {}", header.block_size);
    println!("Chunk size:     {} KiB", header.chunk_size);
    println!("Hash:           {:#018x}", header.hash);
    println!("Obfuscated TOC: {}", header.encrypted_entry_headers);
    println!("Master key:     {:#018x}", archive.master_key());
    println!(
        "Offsets:        toc {:#x}, names {:#x}, paths {:#x}, data {:#x}",
        header.offset_toc, header.offset_name, header.offset_full_path, header.offset_data
    );

    Ok(())
}

fn cmd_list(path: &Path, filter: Option<&str>, detailed: bool, json: bool) -> Result<()> {
    let archive = open(path)?;
    let pattern = filter.map(compile_filter).transpose()?;

    let entries: Vec<&Entry> = archive
        .iter()
        .filter(|e| matches_filter(pattern.as_ref(), e))
        .collect();

    if json {
        let rows: Vec<EntryRow<'_>> = entries.iter().map(|e| EntryRow::from(*e)).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for entry in &entries {
        if detailed {
            println!(
                "{:>12} {:>12} {:<24} {}",
                entry.compressed_size(),
                entry.size(),
                entry.flags().to_string(),
                entry.path()
            );
        } else {
            println!("{}", entry.path());
        }
    }

    println!("\nTotal: {} entries", entries.len());

    Ok(())
}

fn cmd_extract(
    path: &Path,
    output: &Path,
    filter: Option<&str>,
    trim: bool,
    parallel: bool,
) -> Result<()> {
    println!("Opening archive: {}", path.display());

    let start = Instant::now();
    let archive = open(path)?;
    println!("Loaded {} entries in {:?}", archive.len(), start.elapsed());

    let pattern = filter.map(compile_filter).transpose()?;
    let indices: Vec<usize> = archive
        .iter()
        .filter(|e| matches_filter(pattern.as_ref(), e))
        .map(|e| e.index())
        .collect();

    println!("Extracting {} entries...", indices.len());

    let pb = ProgressBar::new(indices.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    fs::create_dir_all(output)?;

    let start = Instant::now();
    let written = AtomicUsize::new(0);
    let errors = AtomicUsize::new(0);

    let handle = |entry: &Entry, data: xvarc_earc::Result<Vec<u8>>| {
        match data
            .map_err(anyhow::Error::from)
            .and_then(|data| write_entry(output, entry, data, trim))
        {
            Ok(true) => {
                written.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {}
            Err(e) => {
                pb.suspend(|| eprintln!("Error extracting {}: {:#}", entry.path(), e));
                errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        pb.inc(1);
    };

    if parallel {
        archive.extract_parallel_with(&indices, handle)?;
    } else {
        for &index in &indices {
            let entry = &archive.entries()[index];
            handle(entry, archive.extract(entry));
        }
    }

    pb.finish_with_message("Done");
    println!(
        "Wrote {} files in {:?} ({} errors)",
        written.load(Ordering::Relaxed),
        start.elapsed(),
        errors.load(Ordering::Relaxed)
    );

    Ok(())
}

/// Write one extracted entry below `output`.
///
/// Returns `false` when nothing was written (no-data entries, unsafe paths).
fn write_entry(output: &Path, entry: &Entry, data: Vec<u8>, trim: bool) -> Result<bool> {
    if entry.is_no_data(&data) {
        debug!(path = entry.path(), "no data, skipping");
        return Ok(false);
    }

    let Some(relative) = sanitize(&entry.output_path()) else {
        warn!(path = entry.path(), "refusing to write outside of the output directory");
        return Ok(false);
    };

    let output_path = output.join(relative);
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let len = if trim && entry.is_encrypted() {
        data.len().min(entry.size() as usize)
    } else {
        data.len()
    };

    fs::write(&output_path, &data[..len])
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    Ok(true)
}

/// Turn an archive path into a relative path, rejecting escapes.
fn sanitize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                // "c:" is a plain component on unix
                let drive = part.to_str().is_some_and(|s| s.ends_with(':'));
                if out.as_os_str().is_empty() && drive {
                    return None;
                }
                out.push(part);
            }
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }

    (!out.as_os_str().is_empty()).then_some(out)
}

fn compile_filter(pattern: &str) -> Result<Pattern> {
    Pattern::new(&pattern.replace('\\', "/"))
        .with_context(|| format!("Invalid filter pattern {pattern:?}"))
}

fn matches_filter(pattern: Option<&Pattern>, entry: &Entry) -> bool {
    const OPTIONS: MatchOptions = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    pattern.map_or(true, |p| {
        p.matches_with(&entry.path().replace('\\', "/"), OPTIONS)
    })
}
