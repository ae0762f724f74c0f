//! Line-based interactive session. Each input line is either a directory to
//! crawl or a `$`-prefixed command acting on the session's crawl manager.

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use indicatif::{HumanBytes, HumanCount};
use log::{error, info, warn};

use crate::report::ConsoleReporter;
use crate::scanner::{CrawlManager, Provenance};
use crate::utils::tokenize;

/// Exit status after a second Ctrl+C.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

const HELP: &str = "\
<directory>        crawl a directory tree
$ dump <file>      write all fingerprints to a new dump file
$ load <file>      add the fingerprints of a dump file
$ count            number of known fingerprints
$ roots            crawled and loaded root directories
$ stats            running totals
$ help             this text
$ kill             end the session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Crawl(String),
    Dump(PathBuf),
    Load(PathBuf),
    Count,
    Roots,
    Stats,
    Help,
    Kill,
}

impl Command {
    /// Parses one input line. Blank lines parse to `Crawl("")`, which the
    /// crawl manager treats as a no-op.
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let Some(command) = line.strip_prefix('$') else {
            return Ok(Command::Crawl(unquote(line).to_string()));
        };

        let tokens = tokenize(command)?;
        let (name, args) = match tokens.split_first() {
            Some((name, args)) => (name.as_str(), args),
            None => return Err("missing command after '$'".to_string()),
        };
        let path_arg = || match args {
            [path] => Ok(PathBuf::from(path)),
            _ => Err(format!("'{name}' takes exactly one file argument")),
        };

        match name {
            "kill" | "quit" | "exit" => Ok(Command::Kill),
            "dump" => path_arg().map(Command::Dump),
            "load" => path_arg().map(Command::Load),
            "count" => Ok(Command::Count),
            "roots" => Ok(Command::Roots),
            "stats" => Ok(Command::Stats),
            "help" => Ok(Command::Help),
            other => Err(format!("unknown command '{other}' (try '$ help')")),
        }
    }
}

fn unquote(line: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = line
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    line
}

/// The crawl manager plus the interrupt flag shared with the Ctrl+C handler.
pub struct Session {
    manager: CrawlManager<ConsoleReporter>,
    interrupted: Arc<AtomicBool>,
}

impl Session {
    pub fn new(manager: CrawlManager<ConsoleReporter>) -> Self {
        Self {
            manager,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn manager(&self) -> &CrawlManager<ConsoleReporter> {
        &self.manager
    }

    pub fn into_manager(self) -> CrawlManager<ConsoleReporter> {
        self.manager
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// The first Ctrl+C lets the running crawl finish and ends the session;
    /// the second one exits immediately.
    pub fn install_interrupt_handler(&self) -> Result<(), ctrlc::Error> {
        let flag = Arc::clone(&self.interrupted);
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                std::process::exit(EXIT_CODE_INTERRUPTED);
            }
            let _ = writeln!(
                std::io::stderr(),
                "\nInterrupted. Finishing the current crawl, press Ctrl+C again to quit now."
            );
        })
    }

    /// Crawls `path`, showing a spinner while it runs. Errors are logged.
    pub fn crawl(&mut self, path: &str) {
        if path.is_empty() {
            return;
        }
        self.manager.reporter_mut().begin(&format!("Crawling {path}..."));
        let result = self.manager.crawl(path);
        self.manager.reporter_mut().finish();
        if let Err(e) = result {
            error!("{e}");
        }
    }

    /// Executes one command. Returns `false` once the session should end.
    pub fn execute(&mut self, command: Command) -> bool {
        match command {
            Command::Crawl(path) => self.crawl(&path),
            Command::Dump(path) => match self.manager.dump(&path) {
                Ok(count) => info!("Dumped {} fingerprints", HumanCount(count as u64)),
                Err(e) => error!("Dump failed: {e}"),
            },
            Command::Load(path) => {
                if let Err(e) = self.manager.load(&path) {
                    error!("Load failed: {e}");
                }
            }
            Command::Count => println!("{}", self.manager.element_count()),
            Command::Roots => {
                for root in self.manager.record().roots() {
                    let tag = match root.provenance {
                        Provenance::Crawled => "crawled".green(),
                        Provenance::Loaded => "loaded".cyan(),
                    };
                    println!("[{tag}] {}", root.path.display());
                }
            }
            Command::Stats => {
                let stats = self.manager.stats();
                println!(
                    "{} fingerprints, {} files ({}) fingerprinted, {} duplicates ({}), {} skipped",
                    HumanCount(self.manager.element_count() as u64),
                    HumanCount(stats.files_fingerprinted),
                    HumanBytes(stats.bytes_fingerprinted),
                    HumanCount(stats.duplicates),
                    HumanBytes(stats.duplicate_bytes),
                    HumanCount(stats.skipped_for_size + stats.unreadable)
                );
            }
            Command::Help => println!("{HELP}"),
            Command::Kill => return false,
        }
        true
    }

    /// Reads commands from `input` until EOF, `$ kill` or an interrupt.
    pub fn run<B: BufRead>(&mut self, input: B) {
        let prompt = std::io::stdin().is_terminal();
        if prompt {
            eprintln!("{}", "Enter directories to crawl, '$ help' for commands.".dimmed());
        }
        let mut lines = input.lines();
        loop {
            if self.is_interrupted() {
                info!("Session interrupted");
                break;
            }
            if prompt {
                eprint!("{} ", ">".bold());
                let _ = std::io::stderr().flush();
            }
            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    error!("Failed to read input: {e}");
                    break;
                }
                None => {
                    info!("Received EOF");
                    break;
                }
            };
            match Command::parse(&line) {
                Ok(command) => {
                    if !self.execute(command) {
                        break;
                    }
                }
                Err(e) => warn!("{e}"),
            }
        }
    }
}
