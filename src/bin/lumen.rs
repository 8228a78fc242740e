use std::{fs, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use log::debug;

use lumen::{
    lexer, parser, runtime::DEFAULT_MAX_CALL_DEPTH, ExecutionContext, Interpreter, LumenError,
    Repl,
};

#[derive(Parser)]
#[command(author, version, about = "Lumen language interpreter")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
    /// Maximum nesting of script function calls
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_depth: usize,
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Lumen script file
    Run { script: PathBuf },
    /// Start an interactive REPL session
    Repl,
    /// Evaluate a snippet of Lumen code
    Eval { source: String },
    /// Print the token stream of a script
    Tokens { script: PathBuf },
    /// Print the parsed syntax tree of a script
    Ast { script: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match execute(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(args: Args) -> Result<(), LumenError> {
    let max_depth = args.max_depth;
    match args.command.unwrap_or(Command::Repl) {
        Command::Run { script } => run_script(script, max_depth),
        Command::Repl => {
            let context = ExecutionContext::default().with_max_call_depth(max_depth);
            let mut repl = Repl::with_interpreter(Interpreter::new().with_context(context));
            repl.run()
        }
        Command::Eval { source } => {
            let context = ExecutionContext::default().with_max_call_depth(max_depth);
            let mut interpreter = Interpreter::new().with_context(context);
            interpreter.eval_source(&source)?;
            Ok(())
        }
        Command::Tokens { script } => {
            let source = fs::read_to_string(&script)?;
            for token in lexer::tokenize(&source)? {
                println!(
                    "{}:{}\t{:?}\t{}",
                    token.line(),
                    token.column(),
                    token.kind,
                    token.lexeme
                );
            }
            Ok(())
        }
        Command::Ast { script } => {
            let source = fs::read_to_string(&script)?;
            let program = parser::parse_source(&source)?;
            println!("{program:#?}");
            Ok(())
        }
    }
}

fn run_script(path: PathBuf, max_depth: usize) -> Result<(), LumenError> {
    let source = fs::read_to_string(&path)?;
    let base_dir = path
        .parent()
        .map(PathBuf::from)
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."));
    debug!("running {} (modules resolve from {})", path.display(), base_dir.display());
    let context = ExecutionContext::new(base_dir).with_max_call_depth(max_depth);
    let mut interpreter = Interpreter::new().with_context(context);
    interpreter.eval_source(&source)?;
    Ok(())
}
