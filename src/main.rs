//! Matryoshka CLI - Command-line tool for browsing nested archives.
//!
//! This is the main entry point for the Matryoshka command-line application.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use matryoshka::prelude::*;
use matryoshka::{ZipEntry, JAR_SCHEME, SEPARATOR};

/// Matryoshka - read entries of archives nested inside archives
#[derive(Parser)]
#[command(name = "matryoshka")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// How root archives are read
    #[arg(long, global = true, value_enum, default_value_t = IoModeArg::Mapped, env = "MATRYOSHKA_IO_MODE")]
    io_mode: IoModeArg,

    /// Skip size and CRC-32 checks
    #[arg(long, global = true)]
    no_verify: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of an archive
    List {
        /// Archive address (`jar:file:app.jar!/lib/nested.jar!/` or `app.jar!/lib/nested.jar`)
        address: String,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,
    },

    /// Write one entry to stdout
    Cat {
        /// Entry address
        address: String,
    },

    /// Look up a resource across root archives
    Find {
        /// Resource name, relative to each root or absolute
        name: String,

        /// Root archive addresses, in lookup order
        #[arg(short, long = "root", required = true)]
        roots: Vec<String>,

        /// Report every match instead of the first
        #[arg(short, long)]
        all: bool,
    },

    /// Extract the entries of an archive
    Extract {
        /// Archive address
        address: String,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum IoModeArg {
    /// Memory-map root archives
    Mapped,
    /// Positional reads on a shared file handle
    Positional,
}

impl From<IoModeArg> for IoMode {
    fn from(mode: IoModeArg) -> Self {
        match mode {
            IoModeArg::Mapped => IoMode::Mapped,
            IoModeArg::Positional => IoMode::Positional,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = ArchiveOptions::new()
        .with_io_mode(cli.io_mode.into())
        .with_verify_checksums(!cli.no_verify);
    let resolver = Arc::new(Resolver::new(options));

    match cli.command {
        Commands::List {
            address,
            filter,
            detailed,
        } => {
            cmd_list(&resolver, &address, filter.as_deref(), detailed)?;
        }
        Commands::Cat { address } => {
            cmd_cat(&resolver, &address)?;
        }
        Commands::Find { name, roots, all } => {
            cmd_find(resolver, &name, &roots, all)?;
        }
        Commands::Extract {
            address,
            output,
            filter,
        } => {
            cmd_extract(&resolver, &address, &output, filter.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

/// Accept either a full `jar:` address or a file path with optional `!/`
/// segments.
fn to_address(arg: &str) -> String {
    if arg.starts_with(JAR_SCHEME) {
        arg.to_string()
    } else if arg.contains(SEPARATOR) {
        format!("{JAR_SCHEME}file:{arg}")
    } else {
        format!("{JAR_SCHEME}file:{arg}{SEPARATOR}")
    }
}

fn open_archive(resolver: &Resolver, arg: &str) -> Result<Arc<Archive>> {
    let address = to_address(arg);
    let resolved = resolver
        .resolve_url(&address)
        .with_context(|| format!("Failed to resolve {address}"))?;
    match resolved {
        Resolved::Archive(archive) => Ok(archive),
        Resolved::Entry(_) => {
            // `app.jar!/lib/nested.jar` names the nested archive as an entry.
            let nested = format!("{address}{SEPARATOR}");
            resolver
                .resolve_url(&nested)?
                .into_archive()
                .with_context(|| format!("{address} is not an archive"))
        }
    }
}

fn compile_filter(filter: Option<&str>) -> Result<Option<Pattern>> {
    filter
        .map(|pattern| Pattern::new(pattern).with_context(|| format!("Invalid filter {pattern}")))
        .transpose()
}

fn selected(filter: &Option<Pattern>, entry: &ZipEntry) -> bool {
    filter.as_ref().map_or(true, |p| p.matches(entry.name()))
}

fn cmd_list(resolver: &Resolver, address: &str, filter: Option<&str>, detailed: bool) -> Result<()> {
    let archive = open_archive(resolver, address)?;
    let filter = compile_filter(filter)?;

    let mut count = 0;
    for entry in archive.entries().iter().filter(|e| selected(&filter, e)) {
        if detailed {
            let modified = entry
                .last_modified()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs());
            println!(
                "{:>12} {:>12} {:>10} {:>8} {}",
                entry.compressed_size(),
                entry.size(),
                modified,
                match entry.compression_method() {
                    Ok(method) => format!("{method:?}"),
                    Err(raw) => format!("#{raw}"),
                },
                entry.name()
            );
        } else {
            println!("{}", entry.name());
        }
        count += 1;
    }

    println!("\nTotal: {} entries in {}", count, archive.url());

    Ok(())
}

fn cmd_cat(resolver: &Resolver, address: &str) -> Result<()> {
    let address = if address.starts_with(JAR_SCHEME) {
        address.to_string()
    } else {
        format!("{JAR_SCHEME}file:{address}")
    };
    let resolved = resolver
        .resolve_url(&address)
        .with_context(|| format!("Failed to resolve {address}"))?;
    let mut reader = resolved.open().context("Failed to open entry")?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    io::copy(&mut reader, &mut out).context("Failed to stream entry")?;
    out.flush()?;

    Ok(())
}

fn cmd_find(resolver: Arc<Resolver>, name: &str, roots: &[String], all: bool) -> Result<()> {
    let roots: Vec<String> = roots.iter().map(|r| to_address(r)).collect();
    let loader = ResourceLoader::new(resolver, &roots).context("Failed to open roots")?;

    let found = if all {
        loader.find_all_resources(name)?
    } else {
        loader.find_resource(name)?.into_iter().collect()
    };

    if found.is_empty() {
        bail!("{name} not found");
    }
    for resource in &found {
        match resource.as_entry() {
            Some(entry) => println!("{:>12} {}", entry.content_length(), resource.url()),
            None => println!("{:>12} {}", "<archive>", resource.url()),
        }
    }

    Ok(())
}

/// Output path for an entry, or `None` if its name would escape `output`.
fn output_path(output: &Path, name: &str) -> Option<PathBuf> {
    let relative = Path::new(name);
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then(|| output.join(relative))
}

fn cmd_extract(resolver: &Resolver, address: &str, output: &Path, filter: Option<&str>) -> Result<()> {
    let start = Instant::now();
    let archive = open_archive(resolver, address)?;
    let filter = compile_filter(filter)?;

    let entries: Vec<&ZipEntry> = archive
        .entries()
        .iter()
        .filter(|e| !e.is_dir() && selected(&filter, e))
        .collect();

    println!("Extracting {} entries from {}...", entries.len(), archive.url());

    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    fs::create_dir_all(output)?;

    entries.par_iter().try_for_each(|entry| -> Result<()> {
        let Some(path) = output_path(output, entry.name()) else {
            warn!(name = entry.name(), "skipping entry outside the output directory");
            pb.inc(1);
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut reader = archive
            .open_entry(entry.name())
            .with_context(|| format!("Failed to open {}", entry.name()))?;
        let mut file = BufWriter::new(File::create(&path)?);
        io::copy(&mut reader, &mut file)
            .with_context(|| format!("Failed to extract {}", entry.name()))?;
        file.flush()?;

        debug!(name = entry.name(), "extracted");
        pb.inc(1);
        Ok(())
    })?;

    pb.finish_with_message("Done");
    println!("Extraction completed in {:?}", start.elapsed());

    Ok(())
}
