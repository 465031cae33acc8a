// clap 2.x `crate_authors!` trips this lint on newer rustc; the macro output is sound.
#![allow(unknown_lints, dangerous_implicit_autorefs)]

#[macro_use]
extern crate clap;

use anyhow::Result;
use clap::{App, Arg, ArgMatches};
use log::LevelFilter;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use symbolicate::{Config, Error};

const EXIT_SUCCESS: i32 = 0;
const EXIT_INPUT: i32 = 1;
const EXIT_FAILURE: i32 = 2;

fn main() {
    let matches = App::new("symbolicate")
        .version(crate_version!())
        .author(crate_authors!("\n"))
        .about(crate_description!())
        .arg(
            Arg::with_name("dsym_path")
                .short("d")
                .long("dsym-path")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Adds a search path for dSYM bundles"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("output")
                .help("Places the symbolicated crash report into <output>"),
        )
        .arg(
            Arg::with_name("atos")
                .long("atos")
                .takes_value(true)
                .value_name("program")
                .help("The address to symbol resolver to run (default: atos)"),
        )
        .arg(
            Arg::with_name("plistbuddy")
                .long("plistbuddy")
                .takes_value(true)
                .value_name("program")
                .help("Reads bundle metadata with this PlistBuddy instead of the default"),
        )
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .takes_value(true)
                .value_name("seconds")
                .validator(|v| v.parse::<u64>().map(|_| ()).map_err(|e| e.to_string()))
                .help("Gives up on an external tool after this many seconds, 0 waits forever (default: 30)"),
        )
        .arg(
            Arg::with_name("keep_blank_lines")
                .long("keep-blank-lines")
                .help("Keeps blank lines of the resolver output"),
        )
        .arg(
            Arg::with_name("case_sensitive_paths")
                .long("case-sensitive-paths")
                .help("Treats search paths differing only in case as different directories"),
        )
        .arg(
            Arg::with_name("highlight")
                .long("highlight")
                .help("Prints symbolicated lines in bold when writing to standard output"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .help("Logs more, may be given several times"),
        )
        .arg(
            Arg::with_name("crash_report")
                .required(true)
                .index(1)
                .help("The crash report file that shall be symbolicated"),
        )
        .get_matches();

    init_logging(matches.occurrences_of("verbose"));

    process::exit(match run(&matches) {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            exit_code_for(&err)
        }
    });
}

fn run(matches: &ArgMatches) -> Result<()> {
    let config = config_from(matches);
    symbolicate::run(&config)?;
    Ok(())
}

fn config_from(matches: &ArgMatches) -> Config {
    // `crash_report` is required, clap exits before we get here without it
    let mut config = Config::new(matches.value_of_os("crash_report").unwrap_or_default());
    if let Some(paths) = matches.values_of_os("dsym_path") {
        config.dsym_paths = paths.map(PathBuf::from).collect();
    }
    config.output = matches.value_of_os("output").map(PathBuf::from);
    if let Some(program) = matches.value_of_os("atos") {
        config.resolver_program = PathBuf::from(program);
    }
    config.plist_buddy = matches.value_of_os("plistbuddy").map(PathBuf::from);
    if let Some(seconds) = matches.value_of("timeout").and_then(|v| v.parse().ok()) {
        config.timeout = match seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        };
    }
    config.keep_blank_lines = matches.is_present("keep_blank_lines");
    config.case_insensitive_paths = !matches.is_present("case_sensitive_paths");
    config.highlight = matches.is_present("highlight");
    config
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .format_timestamp(None)
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(err) if err.is_input_error() => EXIT_INPUT,
        _ => EXIT_FAILURE,
    }
}
