//! Crawl policy and the optional TOML configuration file it can be read from.

use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::fingerprint::DigestAlgorithm;

/// Settings the crawl manager is constructed with. Built once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    pub algorithm: DigestAlgorithm,
    pub report_duplicates: bool,
    pub report_empty_files: bool,
    pub report_empty_dirs: bool,
    /// Zero-byte files are neither fingerprinted nor inserted.
    pub skip_empty_files: bool,
    /// Files smaller than this are skipped.
    pub min_file_size: Option<u64>,
    /// Files larger than this are skipped.
    pub max_file_size: Option<u64>,
}

impl Policy {
    /// Turns on duplicate reporting when nothing at all would be reported.
    pub fn with_fallback_reporting(mut self) -> Self {
        if !(self.report_duplicates || self.report_empty_files || self.report_empty_dirs) {
            self.report_duplicates = true;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min_file_size, self.max_file_size) {
            if min > max {
                return Err(Error::Configuration(format!(
                    "minimum file size ({min}) exceeds maximum file size ({max})"
                )));
            }
        }
        Ok(())
    }
}

/// Contents of a configuration file. Every key is optional.
///
/// ```toml
/// hash-algorithm = "SHA-512"
/// list-duplicates = true
/// max-file-size = "10Mi"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub hash_algorithm: Option<DigestAlgorithm>,
    pub list_duplicates: Option<bool>,
    pub list_empty_files: Option<bool>,
    pub list_empty_dirs: Option<bool>,
    pub skip_empty_files: Option<bool>,
    #[serde(deserialize_with = "deserialize_size")]
    pub min_file_size: Option<u64>,
    #[serde(deserialize_with = "deserialize_size")]
    pub max_file_size: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::parse(&content).map_err(|e| match e {
            Error::Configuration(reason) => {
                Error::Configuration(format!("{}: {reason}", path.display()))
            }
            other => other,
        })?;
        debug!("Loaded configuration from '{}': {:?}", path.display(), config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Configuration(e.message().to_string()))
    }

    /// Applies the file's values on top of `policy`.
    pub fn apply_to(&self, mut policy: Policy) -> Policy {
        if let Some(algorithm) = self.hash_algorithm {
            policy.algorithm = algorithm;
        }
        policy.report_duplicates |= self.list_duplicates.unwrap_or(false);
        policy.report_empty_files |= self.list_empty_files.unwrap_or(false);
        policy.report_empty_dirs |= self.list_empty_dirs.unwrap_or(false);
        policy.skip_empty_files |= self.skip_empty_files.unwrap_or(false);
        policy.min_file_size = self.min_file_size.or(policy.min_file_size);
        policy.max_file_size = self.max_file_size.or(policy.max_file_size);
        policy
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Human(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Bytes(bytes) => Ok(Some(bytes)),
        Size::Human(text) => parse_size(&text).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parses a byte count with an optional binary suffix: `k`/`Ki`, `M`/`Mi`,
/// `G`/`Gi`, `T`/`Ti`. All suffixes are powers of 1024.
pub fn parse_size(input: &str) -> Result<u64> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, suffix) = input.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::Configuration(format!("\"{input}\" is not a size")))?;

    let multiplier: u64 = match suffix {
        "" => 1,
        "k" | "Ki" => 1 << 10,
        "M" | "Mi" => 1 << 20,
        "G" | "Gi" => 1 << 30,
        "T" | "Ti" => 1 << 40,
        other => {
            return Err(Error::Configuration(format!(
                "unknown binary suffix \"{other}\" in \"{input}\""
            )));
        }
    };
    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Configuration(format!("size \"{input}\" is too large")))
}
