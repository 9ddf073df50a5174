//! File-based subcommands

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use cairn_core::asm::assemble_named;
use cairn_core::bytecode::{disassemble_program, Program};
use cairn_core::{Vm, VmConfig};
use tracing::info;

/// Load the engine configuration, or the defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<VmConfig> {
    let Some(path) = path else {
        return Ok(VmConfig::default());
    };
    let config = VmConfig::load(path)
        .with_context(|| format!("Failed to load config '{}'", path.display()))?;
    info!(
        path = %path.display(),
        max_stack_depth = config.max_stack_depth,
        div_scale = config.div_scale,
        max_steps = config.max_steps,
        "loaded config"
    );
    Ok(config)
}

/// Read and assemble a listing file
fn assemble_file(path: &Path) -> Result<Program> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file '{}'", path.display()))?;
    let program = assemble_named(&source, path.display().to_string())
        .map_err(|e| anyhow::anyhow!("{}:{e}", path.display()))?;
    Ok(program)
}

/// Assemble and run a listing, returning the finished VM
pub fn run_file(path: &Path, config: VmConfig) -> Result<Vm> {
    let program = assemble_file(path)?;
    let mut vm = Vm::with_config(config);
    vm.run_program(&program)
        .map_err(|e| anyhow::anyhow!("Runtime error in '{}': {e}", path.display()))?;
    Ok(vm)
}

/// Disassemble a listing file
pub fn disassemble_file(path: &Path) -> Result<String> {
    let program = assemble_file(path)?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    Ok(disassemble_program(&program, &name))
}

/// The stack, top first, one value per line
pub fn format_stack(vm: &Vm) -> String {
    let mut output = String::new();
    for (depth, value) in vm.stack().iter().rev().enumerate() {
        let _ = writeln!(output, "[{depth}] {value}  ({})", value.type_name());
    }
    output
}

/// Variables sorted by name, one per line
pub fn format_variables(vm: &Vm) -> String {
    let mut output = String::new();
    for (name, value) in vm.variables() {
        let _ = writeln!(output, "{name} = {value}");
    }
    output
}
