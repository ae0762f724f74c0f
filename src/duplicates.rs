use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;
use indicatif::{HumanBytes, HumanCount};
use log::info;

use crate::fingerprint::FileIdentity;
use crate::utils::format_human_elapsed;

/// Where an identity was first seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    File(PathBuf),
    Dump(PathBuf),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::File(path) => write!(f, "{}", path.display()),
            Origin::Dump(path) => write!(f, "<entry loaded from {}>", path.display()),
        }
    }
}

/// The deduplication index. Grows monotonically; the first occurrence of an
/// identity is kept and later occurrences are rejected.
#[derive(Debug, Default)]
pub struct IdentitySet {
    members: HashMap<FileIdentity, Origin>,
}

impl IdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `identity` unless an equal member exists, in which case the
    /// existing member's origin is returned and the set is unchanged.
    pub fn insert(&mut self, identity: FileIdentity, origin: Origin) -> Option<&Origin> {
        match self.members.entry(identity) {
            Entry::Occupied(existing) => Some(existing.into_mut()),
            Entry::Vacant(slot) => {
                slot.insert(origin);
                None
            }
        }
    }

    pub fn contains(&self, identity: &FileIdentity) -> bool {
        self.members.contains_key(identity)
    }

    pub fn origin_of(&self, identity: &FileIdentity) -> Option<&Origin> {
        self.members.get(identity)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &FileIdentity> {
        self.members.keys()
    }
}

/// Running totals kept by the crawl manager.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    pub directories: u64,
    pub files_fingerprinted: u64,
    pub bytes_fingerprinted: u64,
    pub duplicates: u64,
    pub duplicate_bytes: u64,
    pub empty_files: u64,
    pub empty_directories: u64,
    pub skipped_for_size: u64,
    pub unreadable: u64,
}

pub fn print_summary(stats: &CrawlStats, element_count: usize, elapsed: Duration) {
    info!(
        "Traversed {} directories, fingerprinted {} files ({})",
        HumanCount(stats.directories),
        HumanCount(stats.files_fingerprinted),
        HumanBytes(stats.bytes_fingerprinted)
    );
    if stats.skipped_for_size > 0 || stats.unreadable > 0 {
        info!(
            "Skipped {} files outside the size bounds, {} unreadable entries",
            HumanCount(stats.skipped_for_size),
            HumanCount(stats.unreadable)
        );
    }
    if stats.empty_files > 0 || stats.empty_directories > 0 {
        info!(
            "Found {} empty files and {} empty directories",
            HumanCount(stats.empty_files),
            HumanCount(stats.empty_directories)
        );
    }

    if stats.duplicates == 0 {
        eprintln!("{}", "No duplicate files found!".green());
    } else {
        eprintln!(
            "{}",
            format!(
                "Found {} duplicate files wasting {} of space",
                HumanCount(stats.duplicates),
                HumanBytes(stats.duplicate_bytes)
            )
            .yellow()
        );
    }
    eprintln!(
        "{} known fingerprints, finished in {}",
        HumanCount(element_count as u64).to_string().bold(),
        format_human_elapsed(elapsed)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(digest: u8, ext: &str) -> FileIdentity {
        FileIdentity::new(ext, vec![digest; 32], 2)
    }

    #[test]
    fn first_occurrence_is_never_flagged() {
        let mut set = IdentitySet::new();
        assert!(set.insert(id(1, "txt"), Origin::File("/a.txt".into())).is_none());
        assert_eq!(
            set.insert(id(1, "TXT"), Origin::File("/b.TXT".into())),
            Some(&Origin::File("/a.txt".into()))
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn rejected_insert_keeps_original_origin() {
        let mut set = IdentitySet::new();
        set.insert(id(7, "bin"), Origin::Dump("/d".into()));
        set.insert(id(7, "bin"), Origin::File("/x.bin".into()));
        assert_eq!(set.origin_of(&id(7, "bin")), Some(&Origin::Dump("/d".into())));
    }

    #[test]
    fn distinct_identities_coexist() {
        let mut set = IdentitySet::new();
        set.insert(id(1, "txt"), Origin::File("/a".into()));
        set.insert(id(1, "bin"), Origin::File("/b".into()));
        set.insert(id(2, "txt"), Origin::File("/c".into()));
        assert_eq!(set.len(), 3);
        assert!(set.contains(&id(2, "TxT")));
        assert_eq!(set.iter().count(), 3);
    }
}
