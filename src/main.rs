use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};
use rjackc::{OUTPUT_EXTENSION, compile_file, jack_sources, output_path, write_tokens_file};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const LONG_ABOUT: &str = "Compile Jack classes into VM code.

Each PATH is a .jack file or a directory; for a directory every .jack file
directly inside it is compiled. Xxx.jack produces Xxx.vm beside the source,
or inside --out-dir when given. Every file is attempted even if an earlier
one fails; the exit status is 1 if any file failed.";

#[derive(Parser, Debug)]
#[command(
  name = "rjackc",
  version,
  about = "Compile Jack classes into VM code",
  long_about = LONG_ABOUT
)]
struct Cli {
  #[arg(value_name = "PATH", required = true)]
  inputs: Vec<PathBuf>,
  #[arg(
    short = 'o',
    long = "out-dir",
    value_name = "DIR",
    long_help = "Write outputs to DIR instead of next to each source file."
  )]
  out_dir: Option<PathBuf>,
  #[arg(
    short = 't',
    long = "tokens",
    long_help = "Also write the token stream of each file as XxxT.xml."
  )]
  tokens: bool,
  #[arg(
    short = 'v',
    long = "verbose",
    action = ArgAction::Count,
    long_help = "Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides."
  )]
  verbose: u8,
}

fn init_logging(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  if let Some(dir) = &cli.out_dir
    && let Err(err) = fs::create_dir_all(dir)
  {
    eprintln!("failed to create {}: {err}", dir.display());
    process::exit(1);
  }

  let mut failed = 0usize;
  let mut compiled = 0usize;

  for input in &cli.inputs {
    let sources = match jack_sources(input) {
      Ok(sources) => sources,
      Err(err) => {
        eprintln!("{err}");
        failed += 1;
        continue;
      }
    };
    if sources.is_empty() {
      warn!(path = %input.display(), "no .jack files found");
    }

    for source in sources {
      let out_dir = cli.out_dir.as_deref();

      if cli.tokens {
        let xml = output_path(&source, out_dir, "T", "xml");
        if let Err(err) = write_tokens_file(&source, &xml) {
          eprintln!("{err}");
          failed += 1;
          continue;
        }
      }

      let vm = output_path(&source, out_dir, "", OUTPUT_EXTENSION);
      match compile_file(&source, &vm) {
        Ok(()) => compiled += 1,
        Err(err) => {
          eprintln!("{err}");
          failed += 1;
        }
      }
    }
  }

  info!(compiled, failed, "done");
  if failed > 0 {
    process::exit(1);
  }
}
