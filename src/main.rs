//! GridBridge command line driver
//!
//! Inspects the effective configuration and exercises the configured
//! datastore without an object mapper on top.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgMatches, Command};
use gridbridge::core::config::{load_config_or_default, LoggingConfig};
use gridbridge::core::{init_logging, Config};
use gridbridge::model::key::{IdSourceKey, IdSourceKeyMetadata, NextValueRequest};
use gridbridge::storage::create_provider;
use tracing::{info, warn};

fn cli() -> Command {
    Command::new("gridbridge")
        .version(gridbridge::VERSION)
        .about("Grid dialect toolkit for NoSQL entity persistence.")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .global(true)
                .help("Log format (json, pretty, compact)"),
        )
        .subcommand(
            Command::new("check-config")
                .about("Load, validate and print the effective configuration"),
        )
        .subcommand(
            Command::new("capabilities").about("Print the facets of the configured dialect"),
        )
        .subcommand(
            Command::new("sequence")
                .about("Draw ids concurrently from one id source and verify they are unique")
                .arg(
                    Arg::new("name")
                        .long("name")
                        .value_name("SEQUENCE")
                        .default_value("gridbridge_sequence")
                        .help("Sequence name"),
                )
                .arg(
                    Arg::new("threads")
                        .long("threads")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .help("Concurrent callers (defaults to the number of CPUs)"),
                )
                .arg(
                    Arg::new("calls")
                        .long("calls")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .default_value("1000")
                        .help("Calls per thread"),
                )
                .arg(
                    Arg::new("initial")
                        .long("initial")
                        .value_name("VALUE")
                        .value_parser(value_parser!(i64))
                        .allow_negative_numbers(true)
                        .help("Initial value (defaults to the configured one)"),
                )
                .arg(
                    Arg::new("increment")
                        .long("increment")
                        .value_name("STEP")
                        .value_parser(value_parser!(i64))
                        .allow_negative_numbers(true)
                        .help("Increment (defaults to the configured one)"),
                ),
        )
}

fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    // Initialize logging
    let mut logging = LoggingConfig::default();
    if let Some(level) = matches.get_one::<String>("log-level") {
        logging.level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        logging.format = format.clone();
    }
    init_logging(&logging)?;

    let config_path = matches.get_one::<PathBuf>("config");
    let lenient_config = || load_config_or_default(config_path.map(PathBuf::as_path));

    match matches.subcommand() {
        Some(("check-config", _)) => check_config(config_path),
        Some(("capabilities", _)) => capabilities(&lenient_config()),
        Some(("sequence", args)) => sequence(&lenient_config(), args),
        Some((other, _)) => bail!("unknown command {}", other),
        None => bail!("a command is required"),
    }
}

/// Strict load: unlike the other commands, a broken config is an error here
fn check_config(path: Option<&PathBuf>) -> anyhow::Result<()> {
    let config = match path {
        Some(path) => {
            Config::load_from(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::load()?,
    };
    print!("{}", toml::to_string_pretty(&config)?);
    info!("Configuration is valid");
    Ok(())
}

fn capabilities(config: &Config) -> anyhow::Result<()> {
    let (provider, resolved) = create_provider(config)?;
    println!("{}", serde_json::to_string_pretty(resolved.capabilities())?);
    provider.stop()?;
    Ok(())
}

fn sequence(config: &Config, args: &ArgMatches) -> anyhow::Result<()> {
    let name = args
        .get_one::<String>("name")
        .context("sequence name is required")?
        .clone();
    let threads = args.get_one::<usize>("threads").copied().unwrap_or_else(num_cpus::get);
    let calls = args.get_one::<usize>("calls").copied().unwrap_or(1000);
    let initial = args
        .get_one::<i64>("initial")
        .copied()
        .unwrap_or(config.sequences.default_initial_value);
    let increment = args
        .get_one::<i64>("increment")
        .copied()
        .unwrap_or(config.sequences.default_increment);

    if increment == 0 {
        bail!("increment must not be zero");
    }

    let (provider, resolved) = create_provider(config)?;
    if !resolved.supports_sequences() {
        bail!("the {} datastore has no native sequences", provider.name());
    }

    let key = IdSourceKey::for_sequence(IdSourceKeyMetadata::for_sequence(name.as_str()));
    info!(
        "Drawing {} values from {} on {} threads",
        threads * calls,
        key,
        threads
    );

    let request = NextValueRequest::new(key.clone(), increment, initial);
    let started = Instant::now();
    let drawn: Vec<gridbridge::Result<Vec<i64>>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(|| {
                    (0..calls)
                        .map(|_| resolved.next_value(&request))
                        .collect::<gridbridge::Result<Vec<i64>>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| match worker.join() {
                Ok(values) => values,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });
    let elapsed = started.elapsed();

    let mut values = Vec::with_capacity(threads * calls);
    for batch in drawn {
        values.extend(batch?);
    }
    let unique: HashSet<i64> = values.iter().copied().collect();
    let next = resolved.next_value(&NextValueRequest::new(key, increment, initial))?;
    let expected_next = initial + increment * values.len() as i64;

    println!("values:     {}", values.len());
    println!("unique:     {}", unique.len());
    println!("min:        {}", values.iter().min().copied().unwrap_or(initial));
    println!("max:        {}", values.iter().max().copied().unwrap_or(initial));
    println!("next:       {} (expected {})", next, expected_next);
    println!("elapsed:    {:?}", elapsed);

    provider.stop()?;

    if unique.len() != values.len() || next != expected_next {
        warn!("Sequence {} produced duplicate or skipped values", name);
        bail!("sequence check failed");
    }
    Ok(())
}
