//! Containerfile rendering.
//!
//! The renderer is the single interpreter for pipeline instructions. Output
//! is deterministic for a fixed recipe: stages render in pipeline order,
//! one commented block each, with no timestamps or environment leakage.

use anyhow::Result;

use super::{emit_all, lint_or_fail, FailureMode, Instruction, Stage, PIPELINE};
use crate::recipe::Recipe;

/// Render the shipped pipeline for a recipe.
pub fn containerfile(recipe: &Recipe) -> Result<String> {
    render(PIPELINE, recipe)
}

/// Render an arbitrary stage list. Lints first; a misordered pipeline is
/// refused rather than rendered.
pub fn render(stages: &[Stage], recipe: &Recipe) -> Result<String> {
    lint_or_fail(stages)?;

    let mut out = String::new();
    out.push_str("# Containerfile rendered by kiln. Regenerate with `kiln render`;\n");
    out.push_str("# edits here are overwritten.\n");

    for (stage, instructions) in emit_all(stages, recipe)? {
        if instructions.is_empty() {
            continue;
        }
        out.push('\n');
        out.push_str(&format!("# stage: {} ({})\n", stage.name, stage.phase));
        for instruction in &instructions {
            out.push_str(&render_instruction(instruction));
            out.push('\n');
        }
    }

    Ok(out)
}

fn render_instruction(instruction: &Instruction) -> String {
    match instruction {
        Instruction::From { reference } => format!("FROM {}", reference),
        Instruction::Comment(text) => format!("# {}", text),
        Instruction::Run { shell, mode } => match mode {
            FailureMode::Fatal => format!("RUN {}", shell),
            FailureMode::BestEffort => format!("RUN {{ {} ; }} || true", shell),
        },
        Instruction::Env { key, value } => format!("ENV {}={}", key, value),
        Instruction::Workdir { path } => format!("WORKDIR {}", path),
        Instruction::Copy { src, dest } => format!("COPY {} {}", src, dest),
        Instruction::Expose { port } => format!("EXPOSE {}", port),
        // Exec form; serde_json gives exact quoting.
        Instruction::Cmd { argv } => {
            format!("CMD {}", serde_json::to_string(argv).expect("argv is plain strings"))
        }
    }
}
