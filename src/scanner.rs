use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::config::Policy;
use crate::duplicates::{CrawlStats, IdentitySet, Origin};
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprinter;
use crate::report::{Event, Reporter};

/// How a root path got into the crawl record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Crawled,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledRoot {
    pub path: PathBuf,
    pub provenance: Provenance,
}

/// Roots crawled (or loaded from dumps) in the order they were added.
#[derive(Debug, Default, Clone)]
pub struct CrawlRecord {
    roots: Vec<CrawledRoot>,
}

impl CrawlRecord {
    pub fn push(&mut self, path: PathBuf, provenance: Provenance) {
        self.roots.push(CrawledRoot { path, provenance });
    }

    pub fn roots(&self) -> &[CrawledRoot] {
        &self.roots
    }
}

/// A directory being walked: its sorted entries and how far we got.
struct Frame {
    path: PathBuf,
    depth: usize,
    entries: std::vec::IntoIter<walkdir::DirEntry>,
    total: usize,
    analyzed: usize,
}

enum EntryKind {
    File,
    Directory,
    Other,
}

/// Walks directory trees, fingerprints every regular file and reports the
/// ones whose identity is already known.
pub struct CrawlManager<R: Reporter> {
    policy: Policy,
    fingerprinter: Fingerprinter,
    identities: IdentitySet,
    record: CrawlRecord,
    stats: CrawlStats,
    reporter: R,
}

impl<R: Reporter> CrawlManager<R> {
    pub fn new(policy: Policy, reporter: R) -> Self {
        Self {
            fingerprinter: Fingerprinter::new(policy.algorithm),
            policy,
            identities: IdentitySet::new(),
            record: CrawlRecord::default(),
            stats: CrawlStats::default(),
            reporter,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn element_count(&self) -> usize {
        self.identities.len()
    }

    pub fn identities(&self) -> &IdentitySet {
        &self.identities
    }

    pub fn record(&self) -> &CrawlRecord {
        &self.record
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut R {
        &mut self.reporter
    }

    pub fn into_reporter(self) -> R {
        self.reporter
    }

    pub(crate) fn identities_mut(&mut self) -> &mut IdentitySet {
        &mut self.identities
    }

    pub(crate) fn record_mut(&mut self) -> &mut CrawlRecord {
        &mut self.record
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.reporter.report(event);
    }

    /// Crawls the directory tree at `path`. An empty string is a no-op.
    ///
    /// Fails without touching any state if `path` is missing or is not a
    /// directory. Per-file and per-directory failures below the root are
    /// reported and skipped.
    pub fn crawl(&mut self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Ok(());
        }

        let root = Path::new(path);
        let root = match fs::canonicalize(root) {
            Ok(canonical) => canonical,
            Err(e) => {
                let path = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
                return Err(match e.kind() {
                    io::ErrorKind::NotFound => Error::Path {
                        path,
                        reason: "does not exist",
                    },
                    _ => Error::io(path, e),
                });
            }
        };
        if !root.is_dir() {
            return Err(Error::Path {
                path: root,
                reason: "is not a directory",
            });
        }

        info!("Crawling '{}'", root.display());
        self.record.push(root.clone(), Provenance::Crawled);
        let before = self.element_count();
        self.traverse(root);
        info!(
            "Crawl finished, {} new fingerprints ({} total)",
            self.element_count() - before,
            self.element_count()
        );
        Ok(())
    }

    /// Depth-first pre-order walk with an explicit stack, visiting entries in
    /// file-name order.
    fn traverse(&mut self, root: PathBuf) {
        let mut stack: Vec<Frame> = Vec::new();
        if let Some(frame) = self.enter_directory(root, 0) {
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            let Some(entry) = frame.entries.next() else {
                if let Some(done) = stack.pop() {
                    self.emit(Event::Analyzed {
                        path: done.path,
                        depth: done.depth,
                        analyzed: done.analyzed,
                        total: done.total,
                    });
                }
                continue;
            };

            let depth = frame.depth;
            match classify(&entry) {
                EntryKind::File => {
                    frame.analyzed += 1;
                    self.handle_file(entry.into_path());
                }
                EntryKind::Directory => {
                    frame.analyzed += 1;
                    if let Some(child) = self.enter_directory(entry.into_path(), depth + 1) {
                        stack.push(child);
                    }
                }
                EntryKind::Other => {
                    debug!("Skipping '{}': not a regular file or directory", entry.path().display());
                }
            }
        }
    }

    /// Lists `path`. Returns `None` when there is nothing to descend into:
    /// the listing failed, or the directory is empty.
    fn enter_directory(&mut self, path: PathBuf, depth: usize) -> Option<Frame> {
        self.stats.directories += 1;
        self.emit(Event::Traversing {
            path: path.clone(),
            depth,
        });

        let entries = match list_directory(&path) {
            Ok(entries) => entries,
            Err(e) => {
                self.stats.unreadable += 1;
                self.emit(Event::UnlistableDirectory {
                    path,
                    reason: e.to_string(),
                });
                return None;
            }
        };

        if entries.is_empty() {
            if self.policy.report_empty_dirs {
                self.stats.empty_directories += 1;
                self.emit(Event::EmptyDirectory { path });
            }
            return None;
        }

        Some(Frame {
            path,
            depth,
            total: entries.len(),
            entries: entries.into_iter(),
            analyzed: 0,
        })
    }

    fn handle_file(&mut self, path: PathBuf) {
        let size = match fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                self.stats.unreadable += 1;
                self.emit(Event::Unreadable {
                    path,
                    reason: e.to_string(),
                });
                return;
            }
        };

        if size == 0 {
            if self.policy.report_empty_files {
                self.stats.empty_files += 1;
                self.emit(Event::EmptyFile {
                    path: canonical(path.clone()),
                });
            }
            if self.policy.skip_empty_files {
                return;
            }
        } else {
            if let Some(max) = self.policy.max_file_size {
                if size > max {
                    self.stats.skipped_for_size += 1;
                    self.emit(Event::TooBig { path, size, max });
                    return;
                }
            }
            if let Some(min) = self.policy.min_file_size {
                if size < min {
                    self.stats.skipped_for_size += 1;
                    self.emit(Event::TooSmall { path, size, min });
                    return;
                }
            }
        }

        let identity = match self.fingerprinter.compute_identity(&path, size) {
            Ok(identity) => identity,
            Err(e) => {
                self.stats.unreadable += 1;
                self.emit(Event::Unreadable {
                    path,
                    reason: e.to_string(),
                });
                return;
            }
        };
        self.stats.files_fingerprinted += 1;
        self.stats.bytes_fingerprinted += identity.size();

        let path = canonical(path);
        let identity_size = identity.size();
        let original = self
            .identities
            .insert(identity, Origin::File(path.clone()))
            .cloned();
        if let Some(original) = original {
            self.stats.duplicates += 1;
            self.stats.duplicate_bytes += identity_size;
            if self.policy.report_duplicates {
                self.emit(Event::Duplicate { path, original });
            }
        }
    }
}

/// Immediate children of `dir`, sorted by file name.
fn list_directory(dir: &Path) -> walkdir::Result<Vec<walkdir::DirEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) => entries.push(entry),
            // The directory itself could not be read.
            Err(e) if e.depth() == 0 || e.path() == Some(dir) => return Err(e),
            Err(e) => debug!("Skipping unreadable entry in '{}': {}", dir.display(), e),
        }
    }
    Ok(entries)
}

/// Symlinks count as files when they resolve to one. Linked directories are
/// not followed.
fn classify(entry: &walkdir::DirEntry) -> EntryKind {
    let file_type = entry.file_type();
    if file_type.is_file() {
        EntryKind::File
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_symlink() {
        match fs::metadata(entry.path()) {
            Ok(target) if target.is_file() => EntryKind::File,
            _ => EntryKind::Other,
        }
    } else {
        EntryKind::Other
    }
}

fn canonical(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}
