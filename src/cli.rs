use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::stream::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_BLOCK_BYTES, SegmenterConfig};

#[derive(Parser, Debug)]
#[command(name = "wikiseek")]
#[command(version)]
#[command(about = "Random access to articles in multistream .xml.bz2 dumps", long_about = None)]
#[command(after_help = "Examples:\n  \
  wikiseek index enwiki-multistream-index.txt.bz2          build index.sqlite from the listing\n  \
  wikiseek locate enwiki-multistream.xml.bz2 Anarchism     print the page XML for one title\n  \
  wikiseek locate -l https://example.com/dump.xml.bz2 A B  locate titles in a remote dump\n  \
  wikiseek blocks enwiki-multistream.xml.bz2 --count 5     list the first five streams")]
pub struct Cli {
    /// Seek index database
    #[arg(long, global = true, env = "WIKISEEK_DB", default_value = "index.sqlite", value_name = "PATH")]
    pub db: PathBuf,

    /// Bytes read from the archive per request
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_SIZE, value_name = "BYTES")]
    pub chunk_size: usize,

    /// Give up on a block that grows past this size
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_BLOCK_BYTES, value_name = "BYTES")]
    pub max_block_bytes: usize,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// More logging (-vv => trace)
    #[arg(short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the seek index from an offset listing (plain text or .bz2)
    Index {
        #[arg(value_name = "LISTING")]
        listing: PathBuf,

        /// Keep an already populated index instead of failing
        #[arg(long)]
        reuse: bool,
    },

    /// Locate articles by title and print their page XML
    Locate {
        /// Archive path or HTTP URL
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        #[arg(value_name = "TITLES", required = true)]
        titles: Vec<String>,

        /// Print only identifier, offset and title
        #[arg(short = 'l')]
        list: bool,

        /// Record PAYLOAD as a derived fact for every located article
        #[arg(long, value_name = "PAYLOAD")]
        record: Option<String>,
    },

    /// Show derived facts recorded for an article
    Facts {
        #[arg(value_name = "ARTICLE_ID")]
        article_id: u64,
    },

    /// List the compressed blocks of an archive
    Blocks {
        /// Archive path or HTTP URL
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// Compressed offset of the first block
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Stop after this many blocks
        #[arg(long)]
        count: Option<usize>,
    },
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig::default()
            .with_chunk_size(self.chunk_size)
            .with_max_block_bytes(self.max_block_bytes)
    }

    /// Default `tracing` filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> String {
        let level = match (self.quiet, self.verbose) {
            (q, _) if q > 1 => "error",
            (1, _) => "warn",
            (_, 0) => "info",
            (_, 1) => "debug",
            _ => "trace",
        };
        format!("warn,wikiseek={level}")
    }
}

/// True for archives given as `http://` or `https://` URLs
pub fn is_http_url(archive: &str) -> bool {
    archive.starts_with("http://") || archive.starts_with("https://")
}
