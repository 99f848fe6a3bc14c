//! `rtmcc` — the command-line entry point for the RT-Micro-C compiler.
//!
//! ```text
//! rtmcc <input.rtmc> [-o <output.vmb>] [--release] [--verbose] [-I <dir>]
//!       [--tokens] [--ast] [--optimize]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use rtmc::driver::{compile, write_output, CompilerConfig};
use rtmc_image::Mode;

struct Args {
    input: PathBuf,
    output: Option<PathBuf>,
    release: bool,
    verbose: bool,
    optimize: bool,
    dump_tokens: bool,
    dump_ast: bool,
    include_paths: Vec<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut input = None;
    let mut output = None;
    let mut release = false;
    let mut verbose = false;
    let mut optimize = false;
    let mut dump_tokens = false;
    let mut dump_ast = false;
    let mut include_paths = Vec::new();

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                output = Some(PathBuf::from(it.next().ok_or("-o requires a path")?));
            }
            "--release" => release = true,
            "--verbose" | "-v" => verbose = true,
            "--optimize" | "-O" => optimize = true,
            "--tokens" => dump_tokens = true,
            "--ast" => dump_ast = true,
            "-I" => {
                include_paths.push(PathBuf::from(it.next().ok_or("-I requires a path")?));
            }
            other if !other.starts_with('-') => {
                if input.is_some() {
                    return Err(format!("unexpected extra argument `{other}`"));
                }
                input = Some(PathBuf::from(other));
            }
            other => return Err(format!("unrecognized flag `{other}`")),
        }
    }

    Ok(Args {
        input: input.ok_or("missing input file")?,
        output,
        release,
        verbose,
        optimize,
        dump_tokens,
        dump_ast,
        include_paths,
    })
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("rtmcc: {msg}");
            eprintln!("usage: rtmcc <input.rtmc> [-o <output.vmb>] [--release] [--verbose] [-I <dir>]");
            return ExitCode::from(6);
        }
    };

    if args.verbose {
        tracing_subscriber::fmt().with_env_filter("rtmc=debug").init();
    }

    let output = args.output.clone().unwrap_or_else(|| args.input.with_extension("vmb"));
    let mut config = CompilerConfig::new(args.input, output.clone());
    config.mode = if args.release { Mode::Release } else { Mode::Debug };
    config.optimize = args.optimize;
    config.dump_tokens = args.dump_tokens;
    config.dump_ast = args.dump_ast;
    config.include_paths.extend(args.include_paths);

    let output_artifacts = match compile(&config) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("rtmcc: {e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    if let Some(tokens) = &output_artifacts.tokens {
        for t in tokens {
            println!("{:>4}:{:<3} {:?}", t.pos.line, t.pos.column, t.kind);
        }
    }
    if let Some(ast) = &output_artifacts.ast {
        println!("{ast:#?}");
    }

    if let Err(e) = write_output(&output, &output_artifacts.bytes) {
        eprintln!("rtmcc: {e}");
        return ExitCode::from(e.exit_code() as u8);
    }

    ExitCode::SUCCESS
}
