mod artifact;
mod codegen;
mod config;
mod error;
mod frontend;
mod lang;
mod logger;
mod pipeline;
mod semantic;
mod symbols;
mod target;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

use crate::config::{CompilerConfig, MAX_REGISTERS};
use crate::error::Error;
use crate::frontend::token_dumper::TokenDumper;
use crate::lang::dump::dump_program;
use crate::lang::program::Program;
use crate::semantic::ExternFunction;

/// Stage after which compilation stops and prints its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stage {
    Tokens,
    Linear,
    High,
    Target,
}

/// Compiles a small C subset to target assembly.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Source file, or an IR artifact with `--from-ir`.
    input: PathBuf,

    /// Target assembly output; stdout when absent.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the high assembly here.
    #[arg(long)]
    high: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Stage::Target)]
    emit: Stage,

    #[arg(long)]
    no_color: bool,

    /// Print token spellings instead of their debug form.
    #[arg(long)]
    pretty: bool,

    /// General purpose registers available to the allocator.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(2..=MAX_REGISTERS as i64))]
    registers: u8,

    /// Function provided by an assembly library, as NAME/ARITY.
    #[arg(long = "extern", value_name = "NAME/ARITY")]
    externs: Vec<ExternFunction>,

    /// Save the linear form to this file.
    #[arg(long)]
    emit_ir: Option<PathBuf>,

    /// Read INPUT as a saved linear form.
    #[arg(long)]
    from_ir: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    logger::init(logger::level_for(args.verbose, args.quiet));

    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let mut config = CompilerConfig::default().with_registers(args.registers as usize);
    for function in &args.externs {
        config = config.with_extern(function.clone());
    }

    let program = if args.from_ir {
        if args.emit == Stage::Tokens {
            log::warn!("an IR artifact has no tokens, emitting the linear form");
        }
        artifact::load(&args.input)?
    } else {
        ensure_extension(&args.input);
        let source = fs::read_to_string(&args.input).map_err(|e| Error::io(&args.input, e))?;
        log::info!("read {} ({} bytes)", args.input.display(), source.len());

        if args.emit == Stage::Tokens {
            dump_tokens(&source, args.no_color, args.pretty)?;
            return Ok(());
        }
        pipeline::front_end(&source, &config)?
    };

    if let Some(path) = &args.emit_ir {
        artifact::save(&program, path)?;
    }

    match args.emit {
        Stage::Tokens | Stage::Linear => print!("{}", dump_program(&program, "  ")),
        Stage::High => {
            let high = pipeline::high_assembly(&program, &config)?;
            write_output(args.output.as_deref(), &high)?;
        }
        Stage::Target => emit_target(args, &program, &config)?,
    }
    Ok(())
}

fn emit_target(args: &Args, program: &Program, config: &CompilerConfig) -> Result<(), Error> {
    let output = pipeline::back_end(program, config)?;
    if let Some(path) = &args.high {
        fs::write(path, &output.high).map_err(|e| Error::io(path, e))?;
    }
    write_output(args.output.as_deref(), &output.target)
}

fn write_output(path: Option<&Path>, text: &str) -> Result<(), Error> {
    match path {
        Some(path) => {
            fs::write(path, text).map_err(|e| Error::io(path, e))?;
            log::info!("wrote {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn ensure_extension(path: &Path) {
    if path.extension().and_then(|e| e.to_str()) != Some("c") {
        log::warn!("expected a .c file, got {}", path.display());
    }
}

fn dump_tokens(source: &str, no_color: bool, pretty: bool) -> Result<(), Error> {
    let tokens = pipeline::tokenize(source)?;
    let mut dumper = TokenDumper::new();

    if no_color {
        dumper = dumper.no_color();
    }
    if pretty {
        dumper = dumper.pretty();
    }

    dumper.dump(&tokens);
    Ok(())
}
