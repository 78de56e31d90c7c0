//! Command-line entry point: wires the document adapter, loader, and VM
//! together and maps the result onto a process exit code.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

use clap::{ArgAction, CommandFactory, Parser};

use ipp23_interpret::error::Error;
use ipp23_interpret::program;
use ipp23_interpret::vm::Vm;

/// `interpret` reads a program document and an optional input stream and
/// executes the program, exiting with the code its last operation produced.
#[derive(Parser, Debug)]
#[command(
    name = "interpret",
    about = "Interpreter for the IPPcode23 instruction language",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// Path to the program document. Defaults to standard input.
    #[arg(long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// Path to the input stream the program's READ instructions consume.
    /// Defaults to standard input.
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    #[arg(short = 'h', long, action = ArgAction::SetTrue)]
    help: bool,

    #[arg(long, action = ArgAction::SetTrue)]
    version: bool,
}

fn main() {
    init_logging();
    std::process::exit(run());
}

fn init_logging() {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprint!("{e}");
            return 10;
        }
    };

    if cli.help {
        if cli.source.is_some() || cli.input.is_some() {
            eprintln!("interpret: --help cannot be combined with other arguments");
            return 10;
        }
        Cli::command().print_help().expect("failed to write usage to standard output");
        println!();
        return 0;
    }

    if cli.version {
        println!("interpret {}", env!("CARGO_PKG_VERSION"));
        return 0;
    }

    if cli.source.is_none() && cli.input.is_none() {
        eprintln!("interpret: at least one of --source or --input is required");
        return 10;
    }

    match execute(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("interpret: {e}");
            e.exit_code()
        }
    }
}

fn execute(cli: &Cli) -> Result<i32, Error> {
    let source_text = read_source(cli.source.as_ref())?;
    let loaded = program::load(&source_text)?;

    let input: Box<dyn io::BufRead> = open_input(cli.input.as_ref())?;
    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut vm = Vm::new(input, stdout.lock(), stderr.lock());
    vm.run(&loaded)
}

fn read_source(path: Option<&PathBuf>) -> Result<String, Error> {
    match path {
        Some(p) => {
            std::fs::read_to_string(p).map_err(|_| Error::MissingFile(p.display().to_string()))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|_| Error::MissingFile("<standard input>".to_string()))?;
            Ok(buf)
        }
    }
}

fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn io::BufRead>, Error> {
    match path {
        Some(p) => {
            let file = File::open(p).map_err(|_| Error::MissingFile(p.display().to_string()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}
