//! Virtual Machine for Cairn bytecode
//!
//! A [`Vm`] owns one operand stack and a variable table. Hosts drive it one
//! instruction at a time with [`Vm::execute`], or hand it a whole
//! [`Program`] with [`Vm::run_program`].
//!
//! A `Vm` is `Send` but has no internal locking: whoever holds one must keep
//! it on one thread at a time or put it behind a lock. The [`Registry`] does
//! the latter for every instance it owns.

mod config;
mod dispatch;
mod error;
mod ops;
pub mod registry;

pub use config::{ConfigError, VmConfig, DEFAULT_DIV_SCALE, DEFAULT_MAX_STACK, DEFAULT_MAX_STEPS};
pub use dispatch::{Dispatcher, Flow, Frame};
pub use error::{ProgramError, VmError, VmResult};
pub use ops::{MAX_BIG_EXPONENT, MAX_BIG_SHIFT};
pub use registry::{Handle, Registry};

use tracing::{debug, trace};

use crate::bytecode::{OpCode, Program, Value};

/// A single virtual machine instance
#[derive(Debug, Clone, Default)]
pub struct Vm {
    frame: Frame,
    dispatcher: Dispatcher,
    /// Instructions still to be skipped in streaming mode
    pending_skip: usize,
}

impl Vm {
    /// Create a new VM instance
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new VM instance with the given limits
    #[must_use]
    pub fn with_config(config: VmConfig) -> Self {
        Self {
            frame: Frame::new(),
            dispatcher: Dispatcher::new(config),
            pending_skip: 0,
        }
    }

    /// Returns the configuration
    #[must_use]
    pub fn config(&self) -> &VmConfig {
        self.dispatcher.config()
    }

    /// Execute one instruction
    ///
    /// After a taken skip of n, the next n calls only check that their opcode
    /// exists. Negative skips need a program counter and fail here with
    /// [`VmError::InvalidSkip`].
    pub fn execute(&mut self, opcode: u8, operand: Option<Value>) -> VmResult<()> {
        let op = OpCode::try_from(opcode).map_err(VmError::UnknownOpcode)?;

        if self.pending_skip > 0 {
            self.pending_skip -= 1;
            trace!(opcode = op.name(), remaining = self.pending_skip, "skipped");
            return Ok(());
        }

        if op.is_skip() {
            let offset = op.offset_operand(operand.as_ref())?;
            if offset < 0 {
                return Err(VmError::InvalidSkip { offset });
            }
        }

        match self.dispatcher.execute(&mut self.frame, opcode, operand)? {
            Flow::Next => {}
            Flow::Skip(offset) => {
                self.pending_skip =
                    usize::try_from(offset).map_err(|_| VmError::InvalidSkip { offset })?;
            }
        }
        Ok(())
    }

    /// Run a program from its first instruction
    ///
    /// Skips move the program counter in either direction; a skip landing
    /// outside `0..=len` is an error. The run stops at the first error.
    pub fn run_program(&mut self, program: &Program) -> Result<(), ProgramError> {
        let instructions = program.instructions();
        let limit = self.config().step_limit();
        let mut pc = 0usize;
        let mut steps = 0u64;

        debug!(
            instructions = instructions.len(),
            source = program.source_name.as_deref().unwrap_or("<program>"),
            "program started"
        );

        while let Some(instruction) = instructions.get(pc) {
            let (index, line) = (pc, instruction.line);
            let fail = move |error| ProgramError { error, index, line };

            steps += 1;
            if let Some(limit) = limit.filter(|limit| steps > *limit) {
                return Err(fail(VmError::StepLimitExceeded { limit }));
            }

            let flow = self
                .dispatcher
                .execute(&mut self.frame, instruction.opcode, instruction.operand.clone())
                .map_err(fail)?;

            pc = match flow {
                Flow::Next => pc + 1,
                Flow::Skip(offset) => i64::try_from(pc + 1)
                    .ok()
                    .and_then(|next| next.checked_add(offset))
                    .and_then(|target| usize::try_from(target).ok())
                    .filter(|target| *target <= instructions.len())
                    .ok_or_else(|| fail(VmError::InvalidSkip { offset }))?,
            };
        }

        debug!(steps, depth = self.frame.stack.len(), "program finished");
        Ok(())
    }

    /// Returns the top of stack
    pub fn top(&self) -> VmResult<&Value> {
        self.frame.top()
    }

    /// Pop the top of stack
    pub fn pop(&mut self) -> VmResult<Value> {
        self.frame.pop()
    }

    /// Returns the number of values on the stack
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frame.stack.len()
    }

    /// Returns the stack, bottom first
    #[must_use]
    pub fn stack(&self) -> &[Value] {
        &self.frame.stack
    }

    /// Returns a variable by name
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.frame.variables.get(name)
    }

    /// Returns all variables, sorted by name
    #[must_use]
    pub fn variables(&self) -> Vec<(&str, &Value)> {
        let mut variables: Vec<_> = self
            .frame
            .variables
            .iter()
            .map(|(name, value)| (name.as_str(), value))
            .collect();
        variables.sort_by(|a, b| a.0.cmp(b.0));
        variables
    }

    /// Returns how many upcoming instructions will be skipped
    #[must_use]
    pub fn pending_skip(&self) -> usize {
        self.pending_skip
    }

    /// Clear the stack, variables and pending skips
    pub fn reset(&mut self) {
        self.frame = Frame::new();
        self.pending_skip = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Instruction;

    fn put(vm: &mut Vm, value: impl Into<Value>) {
        vm.execute(OpCode::Put.code(), Some(value.into())).unwrap();
    }

    #[test]
    fn test_execute_and_inspect() {
        let mut vm = Vm::new();
        put(&mut vm, 2);
        put(&mut vm, 3);
        vm.execute(OpCode::Add.code(), None).unwrap();

        assert_eq!(vm.depth(), 1);
        assert_eq!(vm.top().unwrap(), &Value::SmallNumber(5));
        assert_eq!(vm.pop().unwrap(), Value::SmallNumber(5));
        assert_eq!(vm.top(), Err(VmError::StackUnderflow { needed: 1, depth: 0 }));
        assert!(vm.pop().is_err());
    }

    #[test]
    fn test_streaming_skip() {
        let mut vm = Vm::new();
        put(&mut vm, true);
        vm.execute(OpCode::SkipIf.code(), Some(Value::SmallNumber(2)))
            .unwrap();
        assert_eq!(vm.pending_skip(), 2);

        put(&mut vm, "skipped");
        // Skipped instructions are still checked for a known opcode
        assert_eq!(vm.execute(99, None), Err(VmError::UnknownOpcode(99)));
        vm.execute(OpCode::Add.code(), None).unwrap();
        assert_eq!(vm.pending_skip(), 0);
        assert_eq!(vm.depth(), 0);

        put(&mut vm, "kept");
        assert_eq!(vm.depth(), 1);
    }

    #[test]
    fn test_streaming_negative_skip() {
        let mut vm = Vm::new();
        put(&mut vm, false);
        assert_eq!(
            vm.execute(OpCode::SkipIfNot.code(), Some(Value::SmallNumber(-1))),
            Err(VmError::InvalidSkip { offset: -1 })
        );
        // The condition was not consumed
        assert_eq!(vm.depth(), 1);
    }

    #[test]
    fn test_big_power_overflow_keeps_stack() {
        let mut vm = Vm::new();
        put(&mut vm, Value::big("1e-10000").unwrap());
        put(&mut vm, 4096);
        vm.execute(OpCode::Pow.code(), None).unwrap();
        put(&mut vm, 4096);
        assert!(matches!(
            vm.execute(OpCode::Pow.code(), None),
            Err(VmError::TypeMismatch { operation: "POW", .. })
        ));
        assert_eq!(vm.depth(), 2);
    }

    #[test]
    fn test_run_program_loop() {
        // i = 0; do { i += 1 } while i < 5
        let mut program = Program::new();
        program.write_op_with(OpCode::Put, 0, 1);
        program.write_op_with(OpCode::SetVar, "i", 1);
        program.write_op_with(OpCode::Put, 1, 2);
        program.write_op_with(OpCode::Increase, "i", 2);
        program.write_op_with(OpCode::GetVar, "i", 3);
        program.write_op_with(OpCode::Put, 5, 3);
        program.write_op(OpCode::Lt, 3);
        program.write_op_with(OpCode::SkipIf, -6, 3);

        let mut vm = Vm::new();
        vm.run_program(&program).unwrap();
        assert_eq!(vm.variable("i"), Some(&Value::SmallNumber(5)));
        assert_eq!(vm.depth(), 0);
    }

    #[test]
    fn test_run_program_error_location() {
        let mut program = Program::new();
        program.write_op_with(OpCode::Put, 1, 1);
        program.write_op_with(OpCode::Put, 0, 2);
        program.write_op(OpCode::Div, 3);

        let mut vm = Vm::new();
        let err = vm.run_program(&program).unwrap_err();
        assert_eq!(err.error, VmError::DivisionByZero);
        assert_eq!(err.index, 2);
        assert_eq!(err.line, 3);
        assert_eq!(vm.depth(), 2);
    }

    #[test]
    fn test_run_program_skip_out_of_bounds() {
        let program: Program = [Instruction::new(OpCode::Skip, Some(Value::SmallNumber(-2)))]
            .into_iter()
            .collect();
        let err = Vm::new().run_program(&program).unwrap_err();
        assert_eq!(err.error, VmError::InvalidSkip { offset: -2 });
    }

    #[test]
    fn test_run_program_skip_to_end() {
        let program: Program = [
            Instruction::new(OpCode::Skip, Some(Value::SmallNumber(1))),
            Instruction::new(OpCode::Pop, None),
        ]
        .into_iter()
        .collect();
        Vm::new().run_program(&program).unwrap();
    }

    #[test]
    fn test_step_limit() {
        let program: Program = [Instruction::new(OpCode::Skip, Some(Value::SmallNumber(-1)))]
            .into_iter()
            .collect();
        let mut vm = Vm::with_config(VmConfig {
            max_steps: 100,
            ..VmConfig::default()
        });
        let err = vm.run_program(&program).unwrap_err();
        assert_eq!(err.error, VmError::StepLimitExceeded { limit: 100 });
    }

    #[test]
    fn test_reset() {
        let mut vm = Vm::new();
        put(&mut vm, 1);
        vm.execute(OpCode::SetVar.code(), Some(Value::text("x"))).unwrap();
        put(&mut vm, 2);
        vm.reset();
        assert_eq!(vm.depth(), 0);
        assert!(vm.variables().is_empty());
    }

    #[test]
    fn test_vm_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Vm>();
    }
}
