use std::fs;
use std::io;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use file_wrapper_dups::{
    Cli, Command, ConsoleReporter, CrawlManager, FileConfig, Policy, Session, print_summary,
};

fn init_logging(level: LevelFilter) {
    let mut config = ConfigBuilder::new();
    config
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off);
    // Falls back to UTC when the local offset cannot be determined.
    let _ = config.set_time_offset_to_local();

    if let Err(e) = TermLogger::init(level, config.build(), TerminalMode::Stderr, ColorChoice::Auto) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

fn build_policy(cli: &Cli) -> Result<Policy> {
    let mut policy = Policy::default();
    if let Some(path) = &cli.config {
        let file_config = FileConfig::load(path)
            .with_context(|| format!("Failed to read configuration '{}'", path.display()))?;
        policy = file_config.apply_to(policy);
    }
    let policy = cli.apply_to(policy).with_fallback_reporting();
    policy.validate()?;
    Ok(policy)
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    init_logging(cli.log_level());

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    debug!("Command line arguments: {:?}", cli);

    let policy = build_policy(&cli)?;
    info!("Using {} fingerprints", policy.algorithm);
    debug!("Policy: {:?}", policy);

    let mut session = Session::new(CrawlManager::new(policy, ConsoleReporter::new()));
    if let Err(e) = session.install_interrupt_handler() {
        warn!("Ctrl+C handling unavailable: {e}");
    }

    if let Some(dump) = &cli.load {
        session.execute(Command::Load(dump.clone()));
    }

    for dir in &cli.dirs {
        if session.is_interrupted() {
            break;
        }
        session.crawl(dir);
    }

    if let Some(dir_file) = &cli.dir_file {
        match fs::read_to_string(dir_file) {
            Ok(content) => {
                for line in content.lines() {
                    if session.is_interrupted() {
                        break;
                    }
                    session.crawl(line.trim());
                }
            }
            Err(e) => error!("Failed to read directory list '{}': {}", dir_file.display(), e),
        }
    }

    if !cli.no_interactive && !session.is_interrupted() {
        session.run(io::stdin().lock());
    }

    let manager = session.into_manager();
    if let Some(destination) = &cli.dump {
        manager
            .dump(destination)
            .with_context(|| format!("Failed to dump to '{}'", destination.display()))?;
    }

    print_summary(manager.stats(), manager.element_count(), start_time.elapsed());
    Ok(())
}
