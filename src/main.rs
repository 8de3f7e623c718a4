use std::fs;
use std::process;

/// Compiler for the hiasm language targeting 32-bit x86 assembly.
#[derive(Debug, clap::Parser)]
#[clap(version, about)]
struct Args {
  /// Input source file
  input: String,

  /// Output assembly file
  #[clap(short, long, default_value = "output.asm")]
  output: String,
}

fn main() {
  use clap::Parser;

  let args = Args::parse();

  let source = match fs::read_to_string(&args.input) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("failed to read '{}': {err}", args.input);
      process::exit(1);
    }
  };

  let compilation = match hiasc::generate_assembly(&source) {
    Ok(compilation) => compilation,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };

  if let Err(err) = fs::write(&args.output, &compilation.asm) {
    eprintln!("failed to write '{}': {err}", args.output);
    process::exit(1);
  }

  // Semantic diagnostics do not stop emission, but they do fail the run.
  if !compilation.errors.is_empty() {
    for error in &compilation.errors {
      eprintln!("error: {error}");
    }
    process::exit(1);
  }
}
