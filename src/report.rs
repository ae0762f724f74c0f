//! The diagnostic sink. The crawl manager describes everything a user may
//! want to see as an [`Event`] and hands it to a [`Reporter`]; where the line
//! ends up is the reporter's business.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use indicatif::{HumanBytes, HumanCount, ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use crate::duplicates::Origin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Traversing {
        path: PathBuf,
        depth: usize,
    },
    /// Emitted when a directory has been fully processed.
    Analyzed {
        path: PathBuf,
        depth: usize,
        analyzed: usize,
        total: usize,
    },
    Duplicate {
        path: PathBuf,
        original: Origin,
    },
    EmptyFile {
        path: PathBuf,
    },
    EmptyDirectory {
        path: PathBuf,
    },
    TooBig {
        path: PathBuf,
        size: u64,
        max: u64,
    },
    TooSmall {
        path: PathBuf,
        size: u64,
        min: u64,
    },
    Unreadable {
        path: PathBuf,
        reason: String,
    },
    UnlistableDirectory {
        path: PathBuf,
        reason: String,
    },
    /// A dump record already present in the identity set.
    AlreadyPresent {
        line: usize,
        record: String,
    },
    MalformedRecord {
        line: usize,
        reason: String,
    },
}

impl Event {
    /// Results are the paths a user asked for (duplicates, empty entries);
    /// everything else is a diagnostic.
    pub fn is_result(&self) -> bool {
        matches!(
            self,
            Event::Duplicate { .. } | Event::EmptyFile { .. } | Event::EmptyDirectory { .. }
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Traversing { path, .. } => write!(f, "Traversing... \"{}\"", path.display()),
            Event::Analyzed {
                path,
                analyzed,
                total,
                ..
            } => write!(f, "Analyzed {analyzed}/{total} entries in \"{}\"", path.display()),
            Event::Duplicate { path, .. } | Event::EmptyFile { path } | Event::EmptyDirectory { path } => {
                write!(f, "{}", path.display())
            }
            Event::TooBig { path, size, max } => write!(
                f,
                "Skipped file \"{}\": too big ({} > {})",
                path.display(),
                HumanBytes(*size),
                HumanBytes(*max)
            ),
            Event::TooSmall { path, size, min } => write!(
                f,
                "Skipped file \"{}\": too small ({} < {})",
                path.display(),
                HumanBytes(*size),
                HumanBytes(*min)
            ),
            Event::Unreadable { path, reason } => {
                write!(f, "Could not read \"{}\": {reason}", path.display())
            }
            Event::UnlistableDirectory { path, reason } => {
                write!(f, "Could not list \"{}\": {reason}", path.display())
            }
            Event::AlreadyPresent { line, record } => {
                write!(f, "Dump line {line}: entry {record} is already present")
            }
            Event::MalformedRecord { line, reason } => {
                write!(f, "Dump line {line}: skipped malformed record ({reason})")
            }
        }
    }
}

pub trait Reporter {
    fn report(&mut self, event: Event);
}

/// Collects events in order. Used by tests and by callers that post-process.
impl Reporter for Vec<Event> {
    fn report(&mut self, event: Event) {
        self.push(event);
    }
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn report(&mut self, event: Event) {
        (**self).report(event);
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report(&mut self, event: Event) {
        (**self).report(event);
    }
}

/// Prints result paths to stdout, one per line, and routes diagnostics
/// through `log`. Shows a spinner on stderr between `begin` and `finish`.
#[derive(Default)]
pub struct ConsoleReporter {
    spinner: Option<ProgressBar>,
    files_seen: u64,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, message: &str) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        self.files_seen = 0;
        self.spinner = Some(pb);
    }

    pub fn finish(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    fn print_result(&self, line: String) {
        match &self.spinner {
            Some(pb) => pb.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&mut self, event: Event) {
        match &event {
            Event::Traversing { path, depth } => {
                debug!("{:indent$}{event}", "", indent = *depth);
                if let Some(pb) = &self.spinner {
                    pb.set_message(format!(
                        "{} files analyzed, in {}",
                        HumanCount(self.files_seen),
                        path.display()
                    ));
                }
            }
            Event::Analyzed { depth, analyzed, .. } => {
                self.files_seen += *analyzed as u64;
                debug!("{:indent$}{event}", "", indent = *depth);
            }
            Event::Duplicate { original, .. } => {
                debug!("{event} duplicates {original}");
                self.print_result(event.to_string());
            }
            Event::EmptyFile { .. } | Event::EmptyDirectory { .. } => {
                self.print_result(event.to_string());
            }
            Event::TooBig { .. } | Event::TooSmall { .. } => info!("{event}"),
            Event::AlreadyPresent { .. } => info!("{event}"),
            Event::Unreadable { .. }
            | Event::UnlistableDirectory { .. }
            | Event::MalformedRecord { .. } => warn!("{event}"),
        }
    }
}

impl Drop for ConsoleReporter {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_events_render_as_bare_paths() {
        let event = Event::Duplicate {
            path: "/root/b.txt".into(),
            original: Origin::File("/root/a.txt".into()),
        };
        assert!(event.is_result());
        assert_eq!(event.to_string(), "/root/b.txt");
        assert_eq!(Event::EmptyDirectory { path: "/root/sub".into() }.to_string(), "/root/sub");
    }

    #[test]
    fn diagnostics_are_not_results() {
        let event = Event::Analyzed {
            path: "/root".into(),
            depth: 0,
            analyzed: 2,
            total: 3,
        };
        assert!(!event.is_result());
        assert_eq!(event.to_string(), "Analyzed 2/3 entries in \"/root\"");
    }

    #[test]
    fn vec_reporter_keeps_order() {
        fn emit<R: Reporter>(mut sink: R, path: &str) {
            sink.report(Event::EmptyFile { path: path.into() });
        }

        let mut events = Vec::new();
        emit(&mut events, "/a");
        emit(&mut events, "/b");
        assert_eq!(
            events,
            vec![
                Event::EmptyFile { path: "/a".into() },
                Event::EmptyFile { path: "/b".into() }
            ]
        );
    }
}
