use clap::Parser;
use std::path::PathBuf;

use crate::config::{Policy, parse_size};
use crate::fingerprint::DigestAlgorithm;

#[derive(Parser, Debug)]
#[command(name = "file-wrapper-dups", version)]
#[command(about = "Find duplicate files by content fingerprint across directory trees")]
pub struct Cli {
    /// Directories to crawl before the interactive session starts
    pub dirs: Vec<String>,

    /// Digest algorithm (SHA-224, SHA-256, SHA-384, SHA-512, SHA-512/256, BLAKE3)
    #[arg(short = 'a', long, value_parser = parse_algorithm)]
    pub hash_algorithm: Option<DigestAlgorithm>,

    /// Print files whose fingerprint was already seen
    #[arg(short = 'd', long)]
    pub list_duplicates: bool,

    /// Print empty directories
    #[arg(short = 'e', long)]
    pub list_empty_dirs: bool,

    /// Print empty files
    #[arg(short = 'f', long)]
    pub list_empty_files: bool,

    /// Never fingerprint zero-byte files
    #[arg(long)]
    pub skip_empty_files: bool,

    /// Skip files smaller than SIZE (accepts k/Ki, M/Mi, G/Gi, T/Ti)
    #[arg(long, value_name = "SIZE", value_parser = parse_size_arg)]
    pub min_file_size: Option<u64>,

    /// Skip files larger than SIZE (accepts k/Ki, M/Mi, G/Gi, T/Ti)
    #[arg(long, value_name = "SIZE", value_parser = parse_size_arg)]
    pub max_file_size: Option<u64>,

    /// File listing one directory to crawl per line
    #[arg(long, value_name = "FILE")]
    pub dir_file: Option<PathBuf>,

    /// Load a dump before crawling
    #[arg(long, value_name = "DUMP")]
    pub load: Option<PathBuf>,

    /// Dump the collected fingerprints when done (never overwrites)
    #[arg(long, value_name = "FILE")]
    pub dump: Option<PathBuf>,

    /// Do not read directories and commands from stdin
    #[arg(short = 'N', long)]
    pub no_interactive: bool,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Applies the command-line switches on top of `policy`.
    pub fn apply_to(&self, mut policy: Policy) -> Policy {
        if let Some(algorithm) = self.hash_algorithm {
            policy.algorithm = algorithm;
        }
        policy.report_duplicates |= self.list_duplicates;
        policy.report_empty_dirs |= self.list_empty_dirs;
        policy.report_empty_files |= self.list_empty_files;
        policy.skip_empty_files |= self.skip_empty_files;
        policy.min_file_size = self.min_file_size.or(policy.min_file_size);
        policy.max_file_size = self.max_file_size.or(policy.max_file_size);
        policy
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => log::LevelFilter::Error,
            (false, 0) => log::LevelFilter::Info,
            (false, 1) => log::LevelFilter::Debug,
            (false, _) => log::LevelFilter::Trace,
        }
    }
}

fn parse_algorithm(value: &str) -> Result<DigestAlgorithm, String> {
    value.parse().map_err(|e: crate::error::Error| e.to_string())
}

fn parse_size_arg(value: &str) -> Result<u64, String> {
    parse_size(value).map_err(|e| e.to_string())
}
