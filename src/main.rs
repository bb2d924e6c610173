//! The `sleepctl` command suspends or hibernates the system.

use sleepctl::config::{SleepConfig, Verb, CONFIG_PATH};
use sleepctl::error::SleepError;
use sleepctl::sleep::{self, SleepEnv};
use std::env;
use std::path::Path;
use std::process::exit;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Prints the command's usage.
///
/// `prog` is the name of the current program.
fn print_usage(prog: &str) {
    eprintln!("Try '{prog} --help' for more information.");
}

/// Prints command help.
fn print_help(prog: &str) {
    println!("Usage:");
    println!(" {prog} COMMAND");
    println!();
    println!("Suspend the system, hibernate the system, or both.");
    println!();
    println!("Options:");
    println!(" -h, --help\tPrints help.");
    println!(" --version\tPrints version.");
    println!();
    println!("Commands:");
    println!(" suspend\t\t\tSuspend the system");
    println!(" hibernate\t\t\tHibernate the system");
    println!(" hybrid-sleep\t\t\tBoth hibernate and suspend the system");
    println!(" suspend-then-hibernate\tInitially suspend and then hibernate");
    println!("\t\t\t\tthe system after a fixed period of time");
}

/// Parses command line arguments.
///
/// Returns `None` when help or version output already handled the
/// invocation.
fn parse_args(prog: &str) -> Result<Option<Verb>, SleepError> {
    let mut verb = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help(prog);
                return Ok(None);
            }
            "--version" => {
                println!("{prog} {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            _ if verb.is_none() => verb = Some(arg.parse::<Verb>()?),
            _ => return Err(SleepError::Usage(format!("unexpected argument `{arg}`"))),
        }
    }
    match verb {
        Some(verb) => Ok(Some(verb)),
        None => Err(SleepError::Usage("missing command".to_owned())),
    }
}

fn run(verb: Verb) -> Result<(), SleepError> {
    let config = SleepConfig::load(Path::new(CONFIG_PATH))?;
    let settings = config.settings(verb)?;
    if !settings.allowed {
        return Err(SleepError::Disabled(verb.to_string()));
    }

    let env = SleepEnv::system();
    match verb {
        Verb::SuspendThenHibernate => sleep::execute_suspend_then_hibernate(&env, &config),
        _ => sleep::execute(&env, verb, &settings.modes, &settings.states),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let prog = env::args().next().unwrap_or_else(|| "sleepctl".to_owned());
    let verb = match parse_args(&prog) {
        Ok(Some(verb)) => verb,
        Ok(None) => exit(0),
        Err(err) => {
            eprintln!("{prog}: {err}");
            print_usage(&prog);
            exit(err.errno());
        }
    };

    if let Err(err) = run(verb) {
        error!(%err, sleep = verb.as_str(), "operation failed");
        exit(err.errno());
    }
}
