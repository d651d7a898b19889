//! Main entry point for the wikiseek CLI application.
//!
//! Builds seek indexes from offset listings and pulls single articles out of
//! local or remote multistream dumps.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use wikiseek::cli::{Command, is_http_url};
use wikiseek::{
    BlockSegmenter, Cli, HttpRangeReader, IndexStore, LocalFileReader, Located, PageLocator, PageSliceParser,
    PageXml, ReadAt,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match &cli.command {
        Command::Index { listing, reuse } => build_index(&cli, listing, *reuse),
        Command::Facts { article_id } => show_facts(&cli, *article_id),
        Command::Locate { archive, .. } | Command::Blocks { archive, .. } => {
            if is_http_url(archive) {
                let reader = Arc::new(HttpRangeReader::new(archive.clone()).await?);
                process_archive(reader.clone(), &cli).await?;

                // Network transfer statistics for HTTP sources
                if !cli.is_quiet() {
                    eprintln!("\nTotal bytes transferred: {}", format_size(reader.transferred_bytes()));
                }
                Ok(())
            } else {
                let reader = Arc::new(LocalFileReader::new(Path::new(archive))?);
                process_archive(reader, &cli).await
            }
        }
    }
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Dispatch the archive-reading subcommands.
async fn process_archive<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Locate {
            titles,
            list,
            record,
            ..
        } => locate_titles(reader, cli, titles, *list, record.as_deref()).await,
        Command::Blocks { offset, count, .. } => list_blocks(reader, cli, *offset, *count).await,
        Command::Index { .. } | Command::Facts { .. } => Ok(()),
    }
}

/// Build the seek index at `--db` from an offset listing.
///
/// With `reuse`, an index that is already populated is kept as is, which
/// makes repeated runs over the same dump cheap.
fn build_index(cli: &Cli, listing: &Path, reuse: bool) -> Result<()> {
    let store = IndexStore::open(&cli.db)?;
    let index = store.seek_index();

    if reuse && !index.is_empty()? {
        if !cli.is_quiet() {
            eprintln!("Reusing {} ({} titles)", cli.db.display(), index.len()?);
        }
        return Ok(());
    }

    let report = index
        .build_from_path(listing)
        .with_context(|| format!("cannot build {} from {}", cli.db.display(), listing.display()))?;

    if !cli.is_quiet() {
        println!(
            "Indexed {} titles into {} ({} lines skipped)",
            report.inserted,
            cli.db.display(),
            report.skipped.len()
        );
    }
    Ok(())
}

fn open_existing_index(cli: &Cli) -> Result<IndexStore> {
    if !cli.db.exists() {
        bail!(
            "No seek index at {} (build one with `wikiseek index <LISTING>`)",
            cli.db.display()
        );
    }
    Ok(IndexStore::open(&cli.db)?)
}

/// Locate each title and print its page.
///
/// Failures are reported per title; the batch only fails as a whole when
/// no title could be located.
async fn locate_titles<R: ReadAt + 'static>(
    reader: Arc<R>,
    cli: &Cli,
    titles: &[String],
    list: bool,
    record: Option<&str>,
) -> Result<()> {
    let store = open_existing_index(cli)?;
    let locator = PageLocator::new(store.seek_index(), reader, PageSliceParser).with_config(cli.segmenter_config());

    let results = locator.locate_all(titles).await;
    let summary = report_located(&store, results, list, record, cli.is_very_quiet());

    if !cli.is_quiet() && titles.len() > 1 {
        eprintln!("Located {} of {} titles", summary.located, titles.len());
    }
    if summary.unrecorded > 0 && !cli.is_very_quiet() {
        eprintln!("Could not record facts for {} titles", summary.unrecorded);
    }
    if summary.located == 0 {
        bail!("None of the requested titles could be located");
    }
    Ok(())
}

/// Outcome of one `locate` batch
#[derive(Debug, Default, PartialEq, Eq)]
struct BatchSummary {
    located: usize,
    /// Located titles whose derived fact could not be stored
    unrecorded: usize,
}

/// Print each located page and record `record` against it.
///
/// A failed lookup or a failed fact write is reported for that title only.
fn report_located(
    store: &IndexStore,
    results: Vec<(String, wikiseek::Result<Located<PageXml>>)>,
    list: bool,
    record: Option<&str>,
    very_quiet: bool,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for (title, result) in results {
        let found = match result {
            Ok(found) => found,
            Err(e) => {
                if !very_quiet {
                    eprintln!("{}: {}", title, e);
                }
                continue;
            }
        };

        summary.located += 1;
        if list {
            println!(
                "{}\t{}\t{}",
                found.entry.article_id, found.entry.byte_offset, found.entry.title
            );
        } else {
            println!("{}", found.article.xml);
        }

        if let Some(payload) = record {
            if let Err(e) = store.facts().record(found.entry.article_id, payload) {
                summary.unrecorded += 1;
                if !very_quiet {
                    eprintln!("{}: cannot record fact: {}", title, e);
                }
            }
        }
    }
    summary
}

/// List blocks starting at `offset`.
///
/// Prints a table of compressed offset, compressed size and decompressed
/// size, followed by a summary line unless quiet.
async fn list_blocks<R: ReadAt + 'static>(
    reader: Arc<R>,
    cli: &Cli,
    offset: u64,
    count: Option<usize>,
) -> Result<()> {
    let mut segmenter = BlockSegmenter::open(reader, offset, cli.segmenter_config()).await?;

    if !cli.is_quiet() {
        println!("{:>14}  {:>12}  {:>12}", "Offset", "Compressed", "Size");
        println!("{}", "-".repeat(42));
    }

    let mut total_compressed = 0u64;
    let mut total_size = 0u64;
    let mut blocks = 0usize;

    while count.is_none_or(|limit| blocks < limit) {
        let Some(block) = segmenter.next_block().await? else {
            break;
        };
        println!(
            "{:>14}  {:>12}  {:>12}",
            block.offset,
            block.compressed_len,
            block.data.len()
        );
        total_compressed += block.compressed_len;
        total_size += block.data.len() as u64;
        blocks += 1;
    }

    if !cli.is_quiet() {
        println!("{}", "-".repeat(42));
        println!(
            "{:>14}  {:>12}  {:>12}  {} blocks",
            "",
            format_size(total_compressed),
            format_size(total_size),
            blocks
        );
    }
    Ok(())
}

fn show_facts(cli: &Cli, article_id: u64) -> Result<()> {
    let store = open_existing_index(cli)?;
    if let Some(entry) = store.seek_index().find_by_id(article_id)? {
        if !cli.is_quiet() {
            eprintln!("{} (offset {})", entry.title, entry.byte_offset);
        }
    }
    for payload in store.facts().for_article(article_id)? {
        println!("{}", payload);
    }
    Ok(())
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
