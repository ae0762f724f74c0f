pub mod cli;
pub mod config;
pub mod dump;
pub mod duplicates;
pub mod error;
pub mod fingerprint;
pub mod report;
pub mod scanner;
pub mod shell;
pub mod utils;

pub use cli::Cli;
pub use config::{FileConfig, Policy, parse_size};
pub use dump::LoadSummary;
pub use duplicates::{CrawlStats, IdentitySet, Origin, print_summary};
pub use error::{Error, Result};
pub use fingerprint::{DigestAlgorithm, FileIdentity, Fingerprinter, NO_EXTENSION};
pub use report::{ConsoleReporter, Event, Reporter};
pub use scanner::{CrawlManager, CrawlRecord, CrawledRoot, Provenance};
pub use shell::{Command, Session};
