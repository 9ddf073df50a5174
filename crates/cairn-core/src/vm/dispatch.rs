//! Instruction dispatch
//!
//! Executes one opcode against a [`Frame`]. Each instruction is checked in
//! full (opcode, operand, stack depth, operand values) before the stack is
//! modified, so a failed instruction leaves the frame unchanged.

use std::collections::HashMap;

use tracing::trace;

use super::config::VmConfig;
use super::error::{VmError, VmResult};
use super::ops;
use crate::bytecode::{OpCode, Value};

/// What the caller should do after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next instruction
    Next,
    /// Skip this many of the following instructions (negative moves back)
    Skip(i64),
}

/// The state an instruction operates on
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Operand stack; the last element is the top
    pub stack: Vec<Value>,
    /// Variables keyed by name
    pub variables: HashMap<String, Value>,
}

impl Frame {
    /// Create an empty frame
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the top of stack
    pub fn top(&self) -> VmResult<&Value> {
        self.stack.last().ok_or(VmError::StackUnderflow {
            needed: 1,
            depth: 0,
        })
    }

    /// Pop the top of stack
    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow {
            needed: 1,
            depth: 0,
        })
    }

    fn replace_top(&mut self, value: Value) {
        if let Some(top) = self.stack.last_mut() {
            *top = value;
        }
    }

    fn variable(&self, name: &str) -> VmResult<&Value> {
        self.variables
            .get(name)
            .ok_or_else(|| VmError::UndefinedVariable(name.to_string()))
    }
}

/// Executes single instructions under a configuration
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: VmConfig,
}

impl Dispatcher {
    /// Create a dispatcher
    #[must_use]
    pub fn new(config: VmConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration
    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Execute one instruction
    pub fn execute(&self, frame: &mut Frame, opcode: u8, operand: Option<Value>) -> VmResult<Flow> {
        let op = OpCode::try_from(opcode).map_err(VmError::UnknownOpcode)?;
        op.check_operand(operand.as_ref())?;

        let effect = op.stack_effect(operand.as_ref())?;
        let depth = frame.stack.len();
        if depth < effect.pops {
            return Err(VmError::StackUnderflow {
                needed: effect.pops,
                depth,
            });
        }
        let limit = self.config.max_stack_depth;
        if depth - effect.pops + effect.pushes > limit {
            return Err(VmError::StackOverflow { limit });
        }

        trace!(opcode = op.name(), depth, "dispatch");

        match op {
            // ===== Stack Operations =====
            OpCode::Put => frame.stack.push(operand.unwrap_or_default()),
            OpCode::Pop => {
                frame.pop()?;
            }

            // ===== Unary Operations =====
            OpCode::Negate => {
                let result = ops::negate(frame.top()?)?;
                frame.replace_top(result);
            }
            OpCode::BitNot => {
                let result = ops::bit_not(frame.top()?)?;
                frame.replace_top(result);
            }
            OpCode::Not => {
                let result = Value::from(!frame.top()?.is_truthy());
                frame.replace_top(result);
            }
            OpCode::Is => {
                let kind = op.kind_operand(operand.as_ref())?;
                let result = Value::from(frame.top()?.kind() == kind);
                frame.replace_top(result);
            }

            // ===== Variables =====
            OpCode::SetVar => {
                let name = op.name_operand(operand.as_ref())?;
                let value = frame.pop()?;
                frame.variables.insert(name, value);
            }
            OpCode::GetVar => {
                let name = op.name_operand(operand.as_ref())?;
                let value = frame.variable(&name)?.clone();
                frame.stack.push(value);
            }
            OpCode::DelVar => {
                let name = op.name_operand(operand.as_ref())?;
                if frame.variables.remove(&name).is_none() {
                    return Err(VmError::UndefinedVariable(name));
                }
            }

            // ===== Control Flow =====
            OpCode::Skip => return Ok(Flow::Skip(op.offset_operand(operand.as_ref())?)),
            OpCode::SkipIf | OpCode::SkipIfNot => {
                let offset = op.offset_operand(operand.as_ref())?;
                let taken = frame.pop()?.is_truthy() == (op == OpCode::SkipIf);
                if taken {
                    return Ok(Flow::Skip(offset));
                }
            }

            // ===== Collections =====
            OpCode::CreateArray => {
                let count = op.count_operand(operand.as_ref())?;
                let items = frame.stack.split_off(depth - count);
                frame.stack.push(Value::Array(items));
            }
            OpCode::CreateMap => {
                let count = op.count_operand(operand.as_ref())?;
                let mut flat = frame.stack.split_off(depth - 2 * count).into_iter();
                let mut pairs = Vec::with_capacity(count);
                while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
                    pairs.push((key, value));
                }
                frame.stack.push(Value::Map(pairs));
            }
            OpCode::Get => {
                let result = ops::get(&frame.stack[depth - 2], &frame.stack[depth - 1])?;
                frame.stack.truncate(depth - 2);
                frame.stack.push(result);
            }
            OpCode::Set => {
                let placement = ops::placement(&frame.stack[depth - 3], &frame.stack[depth - 2])?;
                let [container, key, value]: [Value; 3] = frame
                    .stack
                    .split_off(depth - 3)
                    .try_into()
                    .map_err(|_| VmError::StackUnderflow { needed: 3, depth })?;
                frame.stack.push(ops::store(container, key, value, placement));
            }

            // ===== Binary and In-place Operations =====
            op => match op.inplace_base() {
                Some(base) => {
                    let name = op.name_operand(operand.as_ref())?;
                    let updated =
                        ops::binary(base, frame.variable(&name)?, frame.top()?, self.config.div_scale)?;
                    frame.pop()?;
                    frame.variables.insert(name, updated);
                }
                None => {
                    let result = ops::binary(
                        op,
                        &frame.stack[depth - 2],
                        &frame.stack[depth - 1],
                        self.config.div_scale,
                    )?;
                    frame.stack.truncate(depth - 2);
                    frame.stack.push(result);
                }
            },
        }

        Ok(Flow::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(frame: &mut Frame, op: OpCode, operand: Option<Value>) -> VmResult<Flow> {
        Dispatcher::default().execute(frame, op.code(), operand)
    }

    fn frame_with(values: Vec<Value>) -> Frame {
        Frame {
            stack: values,
            variables: HashMap::new(),
        }
    }

    #[test]
    fn test_put_defaults_to_null() {
        let mut frame = Frame::new();
        run(&mut frame, OpCode::Put, None).unwrap();
        run(&mut frame, OpCode::Put, Some(Value::SmallNumber(3))).unwrap();
        assert_eq!(frame.stack, vec![Value::Null, Value::SmallNumber(3)]);
    }

    #[test]
    fn test_binary_pops_two_pushes_one() {
        let mut frame = frame_with(vec![Value::SmallNumber(10), Value::SmallNumber(4)]);
        run(&mut frame, OpCode::Sub, None).unwrap();
        assert_eq!(frame.stack, vec![Value::SmallNumber(6)]);
    }

    #[test]
    fn test_failure_leaves_stack_unchanged() {
        let original = vec![Value::SmallNumber(1), Value::text("x")];
        let mut frame = frame_with(original.clone());
        assert!(run(&mut frame, OpCode::Mul, None).is_err());
        assert_eq!(frame.stack, original);

        let mut frame = frame_with(vec![Value::SmallNumber(1)]);
        assert_eq!(
            run(&mut frame, OpCode::Add, None),
            Err(VmError::StackUnderflow { needed: 2, depth: 1 })
        );
        assert_eq!(frame.stack, vec![Value::SmallNumber(1)]);
    }

    #[test]
    fn test_unknown_opcode() {
        let mut frame = Frame::new();
        assert_eq!(
            Dispatcher::default().execute(&mut frame, 200, None),
            Err(VmError::UnknownOpcode(200))
        );
        assert!(frame.stack.is_empty());
    }

    #[test]
    fn test_stack_overflow() {
        let dispatcher = Dispatcher::new(VmConfig {
            max_stack_depth: 2,
            ..VmConfig::default()
        });
        let mut frame = Frame::new();
        dispatcher.execute(&mut frame, OpCode::Put.code(), None).unwrap();
        dispatcher.execute(&mut frame, OpCode::Put.code(), None).unwrap();
        assert_eq!(
            dispatcher.execute(&mut frame, OpCode::Put.code(), None),
            Err(VmError::StackOverflow { limit: 2 })
        );
        assert_eq!(frame.stack.len(), 2);
    }

    #[test]
    fn test_create_array_order() {
        let mut frame = frame_with(vec![
            Value::SmallNumber(1),
            Value::SmallNumber(2),
            Value::SmallNumber(3),
        ]);
        run(&mut frame, OpCode::CreateArray, Some(Value::SmallNumber(2))).unwrap();
        assert_eq!(frame.stack.len(), 2);
        assert_eq!(frame.stack[1].to_string(), "[2, 3]");
    }

    #[test]
    fn test_create_map_pairs() {
        let mut frame = frame_with(vec![
            Value::text("a"),
            Value::SmallNumber(1),
            Value::text("b"),
            Value::SmallNumber(2),
        ]);
        run(&mut frame, OpCode::CreateMap, Some(Value::SmallNumber(2))).unwrap();
        assert_eq!(frame.stack.len(), 1);
        assert_eq!(frame.stack[0].to_string(), "{\"a\": 1, \"b\": 2}");
    }

    #[test]
    fn test_get_and_set() {
        let array = Value::array(vec![Value::Null, Value::Null]);
        let mut frame = frame_with(vec![array, Value::SmallNumber(1), Value::text("v")]);
        run(&mut frame, OpCode::Set, None).unwrap();
        assert_eq!(frame.stack.len(), 1);
        assert_eq!(frame.stack[0].to_string(), "[null, \"v\"]");

        frame.stack.push(Value::SmallNumber(1));
        run(&mut frame, OpCode::Get, None).unwrap();
        assert_eq!(frame.stack, vec![Value::text("v")]);
    }

    #[test]
    fn test_set_out_of_range_leaves_stack() {
        let mut frame = frame_with(vec![
            Value::array(vec![]),
            Value::SmallNumber(0),
            Value::True,
        ]);
        assert_eq!(
            run(&mut frame, OpCode::Set, None),
            Err(VmError::IndexOutOfRange { index: 0, length: 0 })
        );
        assert_eq!(frame.stack.len(), 3);
    }

    #[test]
    fn test_variables() {
        let mut frame = frame_with(vec![Value::SmallNumber(5)]);
        run(&mut frame, OpCode::SetVar, Some(Value::text("x"))).unwrap();
        assert!(frame.stack.is_empty());

        run(&mut frame, OpCode::GetVar, Some(Value::text("x"))).unwrap();
        assert_eq!(frame.stack, vec![Value::SmallNumber(5)]);

        run(&mut frame, OpCode::Increase, Some(Value::text("x"))).unwrap();
        assert!(frame.stack.is_empty());
        assert_eq!(frame.variables["x"], Value::SmallNumber(10));

        run(&mut frame, OpCode::DelVar, Some(Value::text("x"))).unwrap();
        assert_eq!(
            run(&mut frame, OpCode::GetVar, Some(Value::text("x"))),
            Err(VmError::UndefinedVariable("x".to_string()))
        );
    }

    #[test]
    fn test_inplace_on_missing_variable_keeps_operand() {
        let mut frame = frame_with(vec![Value::SmallNumber(1)]);
        assert!(run(&mut frame, OpCode::InplaceMul, Some(Value::text("y"))).is_err());
        assert_eq!(frame.stack, vec![Value::SmallNumber(1)]);
    }

    #[test]
    fn test_skip_flow() {
        let mut frame = frame_with(vec![Value::False, Value::True]);
        assert_eq!(
            run(&mut frame, OpCode::SkipIf, Some(Value::SmallNumber(2))),
            Ok(Flow::Skip(2))
        );
        assert_eq!(
            run(&mut frame, OpCode::SkipIf, Some(Value::SmallNumber(2))),
            Ok(Flow::Next)
        );
        assert!(frame.stack.is_empty());
        assert_eq!(
            run(&mut frame, OpCode::Skip, Some(Value::SmallNumber(-4))),
            Ok(Flow::Skip(-4))
        );
    }

    #[test]
    fn test_is_kind() {
        let mut frame = frame_with(vec![Value::SmallNumber(1)]);
        run(&mut frame, OpCode::Is, Some(Value::text("SmallNumber"))).unwrap();
        assert_eq!(frame.stack, vec![Value::True]);
        run(&mut frame, OpCode::Is, Some(Value::text("Number"))).unwrap();
        assert_eq!(frame.stack, vec![Value::False]);
    }

    #[test]
    fn test_unary() {
        let mut frame = frame_with(vec![Value::Number(2.5)]);
        run(&mut frame, OpCode::Negate, None).unwrap();
        assert_eq!(frame.stack, vec![Value::Number(-2.5)]);
        run(&mut frame, OpCode::Not, None).unwrap();
        assert_eq!(frame.stack, vec![Value::False]);
    }
}
