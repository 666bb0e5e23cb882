use anyhow::{Context, Result};
use serde_json::to_string_pretty;
use std::fs;
use std::path::PathBuf;

use crate::builtins::BuiltinRegistry;
use crate::parser::{Diagnostic, Program};

/// Execute the parse command: parse a script and write the AST as JSON.
/// On failure, report diagnostics with the offending source line and exit
/// non-zero; `errors_json` emits them as a JSON payload on stdout instead.
pub fn execute(input: PathBuf, output: Option<PathBuf>, errors_json: bool) -> Result<()> {
    let source = fs::read_to_string(&input)
        .with_context(|| format!("Failed to read file: {}", input.display()))?;

    let builtins = BuiltinRegistry::standard();
    let program = match Program::parse(&source, &builtins) {
        Ok(program) => program,
        Err(diagnostics) => {
            if errors_json {
                let payload = serde_json::json!({
                    "file": input.display().to_string(),
                    "errors": diagnostics,
                });
                println!("{}", serde_json::to_string(&payload)?);
            } else {
                for diagnostic in &diagnostics {
                    print_diagnostic(&source, diagnostic);
                }
            }
            std::process::exit(1);
        }
    };

    let json = to_string_pretty(&serde_json::json!({
        "statements": program.statements,
        "blocks": program.blocks.values().map(|b| b.as_ref()).collect::<Vec<_>>(),
        "cursors": program.cursors,
        "screens": program.screens,
    }))
    .context("Failed to serialize AST to JSON")?;

    let output_path = output.unwrap_or_else(|| {
        let mut path = input.clone();
        path.set_extension("json");
        path
    });
    fs::write(&output_path, json)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    println!("Wrote {}", output_path.display());
    Ok(())
}

/// `line: message`, then the source line with a marker under it.
fn print_diagnostic(source: &str, diagnostic: &Diagnostic) {
    eprintln!(
        "{} at line {}: {}",
        diagnostic.kind, diagnostic.line, diagnostic.message
    );
    if let Some(text) = source.lines().nth(diagnostic.line.saturating_sub(1) as usize) {
        eprintln!("  {text}");
    }
}
