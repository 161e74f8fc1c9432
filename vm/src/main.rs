use std::path::PathBuf;
use std::process;

use clap::Parser as ClapParser;

use vm::{
    exception_to_string, interpret_program, value_to_display, EvalResult,
    Runtime,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The source file to execute
    file: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let source = match std::fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {}: {err}", cli.file.display());
            process::exit(1);
        }
    };

    let program = match syntax::parse_source(&source) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{}:{err}", cli.file.display());
            process::exit(1);
        }
    };

    let runtime = Runtime::new();
    let vm = match runtime.register_thread() {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("internal error: {err}");
            process::exit(3);
        }
    };
    let mut cx = vm.borrow_mut();
    let Some(scope) = cx.make_global_scope() else {
        eprintln!("internal error: could not create the global scope");
        process::exit(3);
    };
    // Keep the scope rooted for the whole run.
    cx.state.scratch.push(scope);

    let scope = cx.state.scratch[0];
    match interpret_program(&mut cx, scope, &program) {
        EvalResult::Value(value) => {
            println!("{}", value_to_display(value));
        }
        EvalResult::Void => {}
        EvalResult::Exc { exception, .. } => {
            eprintln!("uncaught exception: {}", exception_to_string(exception));
            process::exit(2);
        }
        EvalResult::Error => {
            let detail = cx.take_internal_error().unwrap_or("unknown failure");
            eprintln!("internal error: {detail}");
            process::exit(3);
        }
    }
}
