//! CLI tool for cataloguing background images found in PowerPoint decks.

use anyhow::{bail, Context, Result};
use bgimg_catalog::{csv_store, open_catalog, Backend, CatalogStore, Gallery, SqliteCatalog};
use bgimg_core::{FormatNormalizer, MagickRasterizer, SizePolicy, DEFAULT_SIZE_TOLERANCE};
use bgimg_engine::{Cataloguer, EngineConfig};
use bgimg_pptx::PptxExtractor;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Extract, deduplicate and catalog full-slide background images from .pptx decks.
#[derive(Parser, Debug)]
#[command(name = "bgimg")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk a directory of decks and catalog their background images
    Scan {
        /// Directory searched recursively for .pptx files
        #[arg(short, long)]
        source: PathBuf,

        /// Directory the first copy of each unique image is saved to
        #[arg(short, long)]
        dest: PathBuf,

        /// Catalog file (.csv for a CSV catalog, anything else is SQLite)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Catalog backing, overriding the extension
        #[arg(short, long, value_enum)]
        backend: Option<BackendArg>,

        /// Per-axis slack, in EMU, when matching a picture to the slide size
        #[arg(short, long, default_value_t = DEFAULT_SIZE_TOLERANCE)]
        tolerance: i64,

        /// Program used to rasterize WMF/EMF pictures (default: ImageMagick on PATH)
        #[arg(short, long)]
        rasterizer: Option<PathBuf>,
    },

    /// Load a CSV catalog into a SQLite catalog
    Import {
        /// CSV catalog to read
        #[arg(long)]
        csv: PathBuf,

        /// SQLite catalog to merge the rows into
        #[arg(short, long)]
        catalog: PathBuf,
    },

    /// Keep one canonical row per image and delete the other saved copies
    Prune {
        #[arg(short, long)]
        catalog: PathBuf,

        #[arg(short, long, value_enum)]
        backend: Option<BackendArg>,
    },

    /// Drop catalog rows whose saved image no longer exists
    Verify {
        #[arg(short, long)]
        catalog: PathBuf,

        #[arg(short, long, value_enum)]
        backend: Option<BackendArg>,
    },

    /// List every unique image with the decks it appears in
    Gallery {
        #[arg(short, long)]
        catalog: PathBuf,

        #[arg(short, long, value_enum)]
        backend: Option<BackendArg>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Leave out images whose file is missing
        #[arg(long)]
        available: bool,
    },

    /// Delete an image and all of its catalog rows
    Remove {
        /// Fingerprint of the image to delete
        fingerprint: String,

        #[arg(short, long)]
        catalog: PathBuf,

        #[arg(short, long, value_enum)]
        backend: Option<BackendArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Csv,
    Sqlite,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Csv => Backend::Csv,
            BackendArg::Sqlite => Backend::Sqlite,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match args.command {
        Command::Scan {
            source,
            dest,
            catalog,
            backend,
            tolerance,
            rasterizer,
        } => scan(&source, dest, &catalog, backend, tolerance, rasterizer),
        Command::Import { csv, catalog } => import(&csv, &catalog),
        Command::Prune { catalog, backend } => prune(&catalog, backend),
        Command::Verify { catalog, backend } => verify(&catalog, backend),
        Command::Gallery {
            catalog,
            backend,
            json,
            available,
        } => gallery(&catalog, backend, json, available),
        Command::Remove {
            fingerprint,
            catalog,
            backend,
        } => remove(&fingerprint, &catalog, backend),
    }
}

/// Open a catalog, taking the backing from `--backend` or the file extension.
fn open_store(catalog: &Path, backend: Option<BackendArg>) -> Result<Box<dyn CatalogStore>> {
    let backend = backend.map(Backend::from).unwrap_or_else(|| Backend::from_path(catalog));
    open_catalog(catalog, backend).with_context(|| format!("Failed to open catalog {}", catalog.display()))
}

fn scan(
    source: &Path,
    dest: PathBuf,
    catalog: &Path,
    backend: Option<BackendArg>,
    tolerance: i64,
    rasterizer: Option<PathBuf>,
) -> Result<()> {
    if tolerance < 0 {
        bail!("Tolerance must not be negative (got {})", tolerance);
    }

    let normalizer = match rasterizer {
        Some(program) => FormatNormalizer::without_rasterizer().with_rasterizer(MagickRasterizer::new(program)),
        None => FormatNormalizer::new(),
    };
    if !normalizer.can_rasterize() {
        log::warn!("No metafile rasterizer available; WMF/EMF pictures will be skipped");
    }

    let mut store = open_store(catalog, backend)?;
    let cataloguer = Cataloguer::new(EngineConfig::new(dest))
        .with_extractor(PptxExtractor::new().with_policy(SizePolicy::new().with_tolerance(tolerance)));

    let summary = cataloguer
        .run(source, store.as_mut(), normalizer)
        .with_context(|| format!("Cataloguing {} failed", source.display()))?;

    println!(
        "{} decks ({} unreadable): {} saved, {} duplicates, {} failed",
        summary.decks, summary.decks_failed, summary.saved, summary.duplicates, summary.failed
    );
    Ok(())
}

fn import(csv: &Path, catalog: &Path) -> Result<()> {
    if Backend::from_path(catalog) == Backend::Csv {
        bail!("Import target {} must be a SQLite catalog", catalog.display());
    }

    let rows = csv_store::read_rows(csv).with_context(|| format!("Failed to read {}", csv.display()))?;
    let mut store =
        SqliteCatalog::open(catalog).with_context(|| format!("Failed to open catalog {}", catalog.display()))?;
    let imported = store.import_bulk(&rows).context("Import failed")?;

    println!("Imported {} rows into {}", imported, catalog.display());
    Ok(())
}

fn prune(catalog: &Path, backend: Option<BackendArg>) -> Result<()> {
    let mut store = open_store(catalog, backend)?;
    let report = store.mark_and_prune_duplicates().context("Pruning duplicates failed")?;
    println!(
        "Demoted {} rows, deleted {} duplicate images",
        report.demoted, report.files_deleted
    );
    Ok(())
}

fn verify(catalog: &Path, backend: Option<BackendArg>) -> Result<()> {
    let mut store = open_store(catalog, backend)?;
    let removed = store.prune_missing().context("Verifying catalog failed")?;
    println!("Removed {} rows with missing images", removed);
    Ok(())
}

fn gallery(catalog: &Path, backend: Option<BackendArg>, json: bool, available: bool) -> Result<()> {
    let store = open_store(catalog, backend)?;
    let gallery = Gallery::new(store.as_ref());
    let entries = if available {
        gallery.available_entries()
    } else {
        gallery.entries()
    }
    .context("Failed to read gallery")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!("{}  {}", entry.fingerprint, entry.image_path.display());
        for deck in &entry.source_decks {
            println!("    {}", deck.display());
        }
    }
    log::debug!("{} unique images", entries.len());
    Ok(())
}

fn remove(fingerprint: &str, catalog: &Path, backend: Option<BackendArg>) -> Result<()> {
    let mut store = open_store(catalog, backend)?;
    match remove_image(store.as_mut(), fingerprint)? {
        Some(path) => println!("Removed {} ({})", fingerprint, path.display()),
        None => println!("No saved image with fingerprint {}", fingerprint),
    }
    Ok(())
}

/// Delete the saved copy of `fingerprint`, then its catalog rows.
///
/// If the file cannot be deleted the rows are left as they were.
fn remove_image(store: &mut dyn CatalogStore, fingerprint: &str) -> Result<Option<PathBuf>> {
    let saved = store
        .records()
        .context("Failed to read catalog")?
        .into_iter()
        .find(|r| r.fingerprint == fingerprint && !r.is_duplicate && r.saved_path.is_some())
        .and_then(|r| r.saved_path);

    if let Some(path) = &saved {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("{} was already deleted", path.display());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    let removed = store.remove(fingerprint).context("Removing image failed")?;
    Ok(saved.or(removed))
}
