//! REPL (Read-Eval-Print Loop) for Cairn
//!
//! Each input line is one listing instruction, executed immediately on a
//! single long-lived VM.

use anyhow::Result;
use cairn_core::asm::parse_line;
use cairn_core::{Vm, VmConfig};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};

use crate::commands::{format_stack, format_variables};

/// REPL prompt shown at the start of each line
const PROMPT: &str = "cairn> ";
/// History file name
const HISTORY_FILE: &str = ".cairn_history";

/// Result of processing a REPL command
#[derive(Debug, PartialEq, Eq)]
enum CommandResult {
    /// Not a command; execute the input
    Continue,
    /// Exit the REPL
    Exit,
    /// Input was handled as a command, with this output
    Handled(String),
}

/// The Cairn REPL
pub struct Repl {
    vm: Vm,
    editor: Editor<(), DefaultHistory>,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(config: VmConfig) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;

        if let Some(home) = home_dir() {
            let _ = editor.load_history(&home.join(HISTORY_FILE));
        }

        Ok(Self {
            vm: Vm::with_config(config),
            editor,
        })
    }

    /// Run the REPL loop
    pub fn run(&mut self) -> Result<()> {
        println!("Cairn v{}", cairn_core::VERSION);
        println!("Type :help for help, :quit to exit");
        println!();

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(line.as_str());

                    match handle_command(&mut self.vm, &line) {
                        CommandResult::Exit => break,
                        CommandResult::Handled(output) => print!("{output}"),
                        CommandResult::Continue => match eval_line(&mut self.vm, &line) {
                            Ok(Some(output)) => println!("{output}"),
                            Ok(None) => {}
                            Err(err) => eprintln!("{err}"),
                        },
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error reading input: {err}");
                    break;
                }
            }
        }

        if let Some(home) = home_dir() {
            let _ = self.editor.save_history(&home.join(HISTORY_FILE));
        }

        Ok(())
    }
}

/// Handle REPL commands (starting with :)
fn handle_command(vm: &mut Vm, input: &str) -> CommandResult {
    let trimmed = input.trim();
    let Some(cmd) = trimmed.strip_prefix(':') else {
        return CommandResult::Continue;
    };

    match cmd.trim().to_lowercase().as_str() {
        "quit" | "q" | "exit" => CommandResult::Exit,
        "help" | "h" | "?" => CommandResult::Handled(HELP.to_string()),
        "stack" | "s" => {
            let stack = format_stack(vm);
            CommandResult::Handled(if stack.is_empty() {
                "(empty stack)\n".to_string()
            } else {
                stack
            })
        }
        "vars" | "v" => {
            let vars = format_variables(vm);
            CommandResult::Handled(if vars.is_empty() {
                "(no variables)\n".to_string()
            } else {
                vars
            })
        }
        "reset" => {
            vm.reset();
            CommandResult::Handled("VM reset\n".to_string())
        }
        other => CommandResult::Handled(format!(
            "Unknown command: :{other}\nType :help for available commands\n"
        )),
    }
}

/// Execute one listing line, returning the new top of stack if any
fn eval_line(vm: &mut Vm, line: &str) -> Result<Option<String>, String> {
    let Some(instruction) = parse_line(line, 1).map_err(|e| format!("Parse error: {}", e.message))?
    else {
        return Ok(None);
    };

    vm.execute(instruction.opcode, instruction.operand)
        .map_err(|e| format!("Runtime error: {e}"))?;

    if vm.pending_skip() > 0 {
        return Ok(Some(format!("(skipping next {})", vm.pending_skip())));
    }
    Ok(vm.top().ok().map(|top| format!("{top}  ({})", top.type_name())))
}

const HELP: &str = "
Cairn REPL Commands:
  :help, :h, :?    Show this help message
  :quit, :q        Exit the REPL
  :stack, :s       Show the stack, top first
  :vars, :v        Show variables
  :reset           Clear the stack and variables

Each line is one instruction, e.g.:
  cairn> PUT 2s
  2  (SmallNumber)
  cairn> PUT 0.5
  0.5  (Number)
  cairn> MUL
  1  (Number)

Literals: 7s small, 2.5 number, 1e40n big, \"text\", null, true, false
";

/// Get the user's home directory
fn home_dir() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(std::path::PathBuf::from)
}
