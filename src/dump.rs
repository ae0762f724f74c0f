//! Persisting the crawl state as a flat text dump:
//!
//! ```text
//! FILE WRAPPER DUMP (<count>) - <timestamp>
//! <root path>...
//! * // * // * // *
//! <hex digest>;<size>;<extension>...
//! ```

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::{HumanBytes, HumanCount};
use log::{debug, info, warn};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::duplicates::Origin;
use crate::error::{Error, Result};
use crate::fingerprint::FileIdentity;
use crate::report::{Event, Reporter};
use crate::scanner::{CrawlManager, Provenance};

pub const HEADER_PREFIX: &str = "FILE WRAPPER DUMP";
pub const SEPARATOR: &str = "* // * // * // *";

/// What a [`CrawlManager::load`] call added.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub roots: usize,
    pub inserted: usize,
    pub already_present: usize,
    pub malformed: usize,
}

fn header_line(count: usize) -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let timestamp = now
        .format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("{HEADER_PREFIX} ({count}) - {timestamp}")
}

/// The element count announced by a header line, if it has one.
fn announced_count(header: &str) -> Option<usize> {
    let rest = header.strip_prefix(HEADER_PREFIX)?.trim_start();
    let inner = rest.strip_prefix('(')?;
    inner[..inner.find(')')?].parse().ok()
}

impl<R: Reporter> CrawlManager<R> {
    /// Writes the crawl record and every known identity to `destination`.
    ///
    /// Never overwrites: an existing `destination` is refused. A failed
    /// write removes the partial file. Returns the number of identities
    /// written.
    pub fn dump(&self, destination: &Path) -> Result<usize> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => Error::DumpExists(destination.to_path_buf()),
                _ => Error::io(destination, e),
            })?;

        info!(
            "Dumping {} fingerprints to '{}'",
            HumanCount(self.element_count() as u64),
            destination.display()
        );
        if let Err(e) = self.write_dump(file) {
            if let Err(cleanup) = fs::remove_file(destination) {
                debug!("Could not remove partial dump '{}': {}", destination.display(), cleanup);
            }
            return Err(Error::io(destination, e));
        }

        let size = fs::metadata(destination).map(|m| m.len()).unwrap_or(0);
        info!("Dump written ({})", HumanBytes(size));
        Ok(self.element_count())
    }

    fn write_dump(&self, file: File) -> io::Result<()> {
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", header_line(self.element_count()))?;
        for root in self.record().roots() {
            writer.write_all(&root_bytes(&root.path))?;
            writer.write_all(b"\n")?;
        }
        writeln!(writer, "{SEPARATOR}")?;
        for identity in self.identities().iter() {
            writer.write_all(&identity.encode_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Adds the roots and identities stored in the dump at `source` to the
    /// current state. Records that are already known are reported, not
    /// inserted; malformed records are reported and skipped.
    pub fn load(&mut self, source: &Path) -> Result<LoadSummary> {
        if !source.is_file() {
            return Err(Error::Path {
                path: source.to_path_buf(),
                reason: "does not exist or is not a file",
            });
        }
        let source_path = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        let file = File::open(source).map_err(|e| Error::io(source, e))?;
        let mut lines = BufReader::new(file).split(b'\n');

        let header = match lines.next() {
            Some(line) => decode_line(line.map_err(|e| Error::io(source, e))?),
            None => None,
        };
        let header = match header {
            Some(header) if header.starts_with(HEADER_PREFIX) => header,
            _ => return Err(Error::NotADump(source.to_path_buf())),
        };
        info!("Loading dump '{}'", source_path.display());

        let mut summary = LoadSummary::default();
        let expected_len = self.policy().algorithm.output_len();
        let mut in_roots = true;
        for (index, line) in lines.enumerate() {
            let number = index + 2;
            let mut line = line.map_err(|e| Error::io(source, e))?;
            strip_line_end(&mut line);

            if in_roots {
                if line == SEPARATOR.as_bytes() {
                    in_roots = false;
                } else if !line.is_empty() {
                    match root_from_bytes(line) {
                        Some(root) => {
                            self.record_mut().push(root, Provenance::Loaded);
                            summary.roots += 1;
                        }
                        None => {
                            summary.malformed += 1;
                            self.emit(Event::MalformedRecord {
                                line: number,
                                reason: "root path is not valid UTF-8".to_string(),
                            });
                        }
                    }
                }
                continue;
            }

            if line.trim_ascii().is_empty() {
                continue;
            }
            let identity = match FileIdentity::decode_bytes(&line) {
                Ok(identity) if identity.digest().len() != expected_len => {
                    Err(Error::format(format!(
                        "digest has {} bytes, {} produces {}",
                        identity.digest().len(),
                        self.policy().algorithm,
                        expected_len
                    )))
                }
                decoded => decoded,
            };
            match identity {
                Ok(identity) => {
                    let present = self
                        .identities_mut()
                        .insert(identity, Origin::Dump(source_path.clone()))
                        .is_some();
                    if present {
                        summary.already_present += 1;
                        self.emit(Event::AlreadyPresent {
                            line: number,
                            record: String::from_utf8_lossy(&line).into_owned(),
                        });
                    } else {
                        summary.inserted += 1;
                    }
                }
                Err(e) => {
                    summary.malformed += 1;
                    let reason = match e {
                        Error::Format(reason) => reason,
                        other => other.to_string(),
                    };
                    self.emit(Event::MalformedRecord {
                        line: number,
                        reason,
                    });
                }
            }
        }

        if in_roots {
            warn!("Dump '{}' has no separator line, no fingerprints loaded", source_path.display());
        }
        let records = summary.inserted + summary.already_present + summary.malformed;
        if let Some(announced) = announced_count(&header) {
            if announced != records {
                warn!(
                    "Dump header announces {} entries but {} records were found",
                    announced, records
                );
            }
        }
        info!(
            "Loaded {} roots and {} new fingerprints ({} already known, {} malformed)",
            summary.roots,
            HumanCount(summary.inserted as u64),
            summary.already_present,
            summary.malformed
        );
        Ok(summary)
    }
}

fn strip_line_end(bytes: &mut Vec<u8>) {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
}

/// Strips the line terminator. `None` if the line is not UTF-8.
fn decode_line(mut bytes: Vec<u8>) -> Option<String> {
    strip_line_end(&mut bytes);
    String::from_utf8(bytes).ok()
}

/// Root paths are stored as their raw bytes.
#[cfg(unix)]
fn root_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn root_bytes(path: &Path) -> Cow<'_, [u8]> {
    match path.to_str() {
        Some(text) => Cow::Borrowed(text.as_bytes()),
        None => {
            warn!("Root '{}' is not valid Unicode, dumped lossily", path.display());
            Cow::Owned(path.to_string_lossy().into_owned().into_bytes())
        }
    }
}

#[cfg(unix)]
fn root_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStringExt;
    Some(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn root_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    String::from_utf8(bytes).ok().map(PathBuf::from)
}
