//! Plugin installer CLI entrypoint.
//!
//! This binary installs a single FogLAMP plugin per invocation, printing the
//! JSON response on stdout and exiting with a code derived from the verdict.
//! It can also list the plugins already installed.

use clap::Parser;
use log::LevelFilter;
use plugin_installer::cli::{Cli, Command, GlobalArgs, InstallArgs, ListArgs};
use plugin_installer::config::InstallerConfig;
use plugin_installer::dirs::{BaseDirs, NoBaseDirs, SystemBaseDirs};
use plugin_installer::error::{InstallerError, Result};
use plugin_installer::list_output::{format_human, format_json};
use plugin_installer::pipeline::{InstallOutcome, Verdict, handle_raw_request, handle_request};
use plugin_installer::response::{InstallResponse, exit_code};
use plugin_installer::scanner::scan_installed;
use std::io::{Read, Write};

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.global);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let exit_code = run(&cli, &mut std::io::stdin(), &mut stdout, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn init_logging(global: &GlobalArgs) {
    let level = log_level(global);
    if let Err(err) = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init()
    {
        write_line(&mut std::io::stderr(), format!("logging disabled: {err}"));
    }
}

fn log_level(global: &GlobalArgs) -> LevelFilter {
    if global.quiet {
        return LevelFilter::Error;
    }
    match global.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn run(cli: &Cli, stdin: &mut dyn Read, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(err) => {
            write_line(stderr, err);
            return exit_code(Verdict::Internal);
        }
    };

    match &cli.command {
        Command::Install(args) => run_install(args, &config, stdin, stdout, stderr),
        Command::List(args) => run_list(args, &config, stdout, stderr),
    }
}

fn load_config(cli: &Cli) -> Result<InstallerConfig> {
    let system_dirs = SystemBaseDirs::new();
    let dirs: &dyn BaseDirs = match &system_dirs {
        Some(dirs) => dirs,
        None => &NoBaseDirs,
    };
    let config = InstallerConfig::discover(cli.global.config.as_deref(), dirs)?
        .with_env()
        .with_overrides(cli.overrides());
    config.validate()?;
    Ok(config)
}

fn run_install(
    args: &InstallArgs,
    config: &InstallerConfig,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let outcome = match args.request.as_deref() {
        Some(source) => match read_request_body(source, stdin) {
            Ok(body) => handle_request(&body, config),
            Err(err) => {
                write_line(stderr, err);
                return exit_code(Verdict::BadRequest);
            }
        },
        None => handle_raw_request(&args.raw_request(), config),
    };
    report_outcome(&outcome, stdout)
}

fn read_request_body(source: &str, stdin: &mut dyn Read) -> Result<String> {
    if source == "-" {
        let mut body = String::new();
        stdin.read_to_string(&mut body)?;
        return Ok(body);
    }
    std::fs::read_to_string(source).map_err(|source_err| InstallerError::Filesystem {
        path: source.into(),
        source: source_err,
    })
}

fn report_outcome(outcome: &InstallOutcome, stdout: &mut dyn Write) -> i32 {
    let response = InstallResponse::from(outcome);
    write_line(stdout, response.body_json());
    exit_code(outcome.verdict)
}

fn run_list(
    args: &ListArgs,
    config: &InstallerConfig,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match scan_installed(&config.directory_layout()) {
        Ok(plugins) => {
            let output = if args.json {
                format_json(&plugins)
            } else {
                format_human(&plugins)
            };
            write_line(stdout, output);
            0
        }
        Err(err) => {
            write_line(stderr, format!("failed to scan plugin directories: {err}"));
            exit_code(Verdict::Internal)
        }
    }
}

fn write_line(out: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(out, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}
