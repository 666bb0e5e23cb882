use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result, bail};

use crate::builtins::BuiltinRegistry;
use crate::host::console::ConsoleHost;
use crate::interp::Interpreter;
use crate::parser::Program;

/// Execute the run command: parse and interpret a script with the console
/// host. Imports resolve relative to the script's directory.
pub fn execute(input: PathBuf) -> Result<()> {
    let source = fs::read_to_string(&input)
        .with_context(|| format!("Failed to read file: {}", input.display()))?;

    let builtins = BuiltinRegistry::standard();
    let program = match Program::parse(&source, &builtins) {
        Ok(program) => program,
        Err(diagnostics) => {
            for diagnostic in &diagnostics {
                eprintln!(
                    "{} at line {}: {}",
                    diagnostic.kind, diagnostic.line, diagnostic.message
                );
            }
            bail!("{} failed to parse", input.display());
        }
    };

    let host = Rc::new(ConsoleHost::new());
    let mut interpreter = Interpreter::with_builtins(host, BuiltinRegistry::standard());
    if let Some(dir) = input.parent() {
        interpreter.set_import_root(dir);
    }
    if interpreter.run(&program).is_err() {
        // Already reported on the host's error stream.
        std::process::exit(1);
    }
    Ok(())
}
