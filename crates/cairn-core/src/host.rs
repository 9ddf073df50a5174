//! Handle-based entry points for embedding hosts
//!
//! A host creates an instance, feeds it instructions with kind-tagged
//! operands, and reads the top of the stack back through typed accessors.
//! The free functions work on the process-wide registry; the same operations
//! are available as methods on any [`Registry`].

use crate::bytecode::{self, Value};
use crate::vm::registry::{self, Handle, Registry};
use crate::vm::{VmError, VmResult};

/// An operand as a host supplies it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<'a> {
    /// No operand
    None,
    /// True or False
    Bool(bool),
    /// A double
    Number(f64),
    /// A double that must be integral and fit a SmallNumber
    Small(f64),
    /// Decimal text parsed into a BigNumber
    Big(&'a str),
    /// A text value
    Text(&'a str),
}

impl Operand<'_> {
    /// Convert into the operand value the VM consumes
    pub fn into_value(self) -> VmResult<Option<Value>> {
        Ok(match self {
            Operand::None => None,
            Operand::Bool(b) => Some(Value::from(b)),
            Operand::Number(n) => Some(Value::Number(n)),
            Operand::Small(n) => Some(Value::small_from_f64(n)?),
            Operand::Big(text) => Some(Value::big(text)?),
            Operand::Text(text) => Some(Value::from(text)),
        })
    }
}

/// Which side of a map pair a slice accessor reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Key,
    Value,
}

/// Element `index` of an array, or the selected side of map pair `index`
fn slice(container: &Value, index: usize, slot: Slot) -> VmResult<&Value> {
    match (container, slot) {
        (Value::Array(_), _) => container.at(index),
        (Value::Map(_), Slot::Key) => container.key_at(index),
        (Value::Map(_), Slot::Value) => container.value_at(index),
        (other, _) => Err(VmError::type_mismatch("Array or Map", other, "slice")),
    }
}

impl Registry {
    /// Execute one instruction on an instance
    pub fn execute(&self, handle: Handle, opcode: u8, operand: Operand<'_>) -> VmResult<()> {
        let operand = operand.into_value()?;
        self.with_vm(handle, |vm| vm.execute(opcode, operand))
    }

    /// Kind code of the top of stack
    pub fn type_of_top(&self, handle: Handle) -> VmResult<u8> {
        self.with_vm(handle, |vm| Ok(vm.top()?.kind().code()))
    }

    /// Canonical rendering of the top of stack
    pub fn top_as_text(&self, handle: Handle) -> VmResult<String> {
        self.with_vm(handle, |vm| Ok(vm.top()?.to_string()))
    }

    /// Numeric top of stack as a double
    pub fn top_as_double(&self, handle: Handle) -> VmResult<f64> {
        self.with_vm(handle, |vm| vm.top()?.to_f64())
    }

    /// Element or pair count of the container on top of the stack
    pub fn top_length(&self, handle: Handle) -> VmResult<usize> {
        self.with_vm(handle, |vm| vm.top()?.len())
    }

    /// Kind code of an element of the container on top of the stack
    pub fn slice_kind(&self, handle: Handle, index: usize, slot: Slot) -> VmResult<u8> {
        self.with_vm(handle, |vm| Ok(slice(vm.top()?, index, slot)?.kind().code()))
    }

    /// Rendering of an element of the container on top of the stack
    pub fn slice_text(&self, handle: Handle, index: usize, slot: Slot) -> VmResult<String> {
        self.with_vm(handle, |vm| Ok(slice(vm.top()?, index, slot)?.to_string()))
    }

    /// Numeric element of the container on top of the stack as a double
    pub fn slice_double(&self, handle: Handle, index: usize, slot: Slot) -> VmResult<f64> {
        self.with_vm(handle, |vm| slice(vm.top()?, index, slot)?.to_f64())
    }

    /// Discard the top of stack
    pub fn pop(&self, handle: Handle) -> VmResult<()> {
        self.with_vm(handle, |vm| vm.pop().map(drop))
    }
}

// ===== Process-wide registry =====

/// Create an instance in the process-wide registry
pub fn create() -> VmResult<Handle> {
    registry::global().create()
}

/// Release an instance from the process-wide registry
pub fn release(handle: Handle) -> VmResult<()> {
    registry::global().release(handle)
}

/// See [`Registry::execute`]
pub fn execute(handle: Handle, opcode: u8, operand: Operand<'_>) -> VmResult<()> {
    registry::global().execute(handle, opcode, operand)
}

/// See [`Registry::type_of_top`]
pub fn type_of_top(handle: Handle) -> VmResult<u8> {
    registry::global().type_of_top(handle)
}

/// See [`Registry::top_as_text`]
pub fn top_as_text(handle: Handle) -> VmResult<String> {
    registry::global().top_as_text(handle)
}

/// See [`Registry::top_as_double`]
pub fn top_as_double(handle: Handle) -> VmResult<f64> {
    registry::global().top_as_double(handle)
}

/// See [`Registry::top_length`]
pub fn top_length(handle: Handle) -> VmResult<usize> {
    registry::global().top_length(handle)
}

/// See [`Registry::slice_kind`]
pub fn slice_kind(handle: Handle, index: usize, slot: Slot) -> VmResult<u8> {
    registry::global().slice_kind(handle, index, slot)
}

/// See [`Registry::slice_text`]
pub fn slice_text(handle: Handle, index: usize, slot: Slot) -> VmResult<String> {
    registry::global().slice_text(handle, index, slot)
}

/// See [`Registry::slice_double`]
pub fn slice_double(handle: Handle, index: usize, slot: Slot) -> VmResult<f64> {
    registry::global().slice_double(handle, index, slot)
}

/// See [`Registry::pop`]
pub fn pop(handle: Handle) -> VmResult<()> {
    registry::global().pop(handle)
}

/// Describe an instruction without executing it
pub fn disassemble(opcode: u8, operand: Operand<'_>) -> VmResult<String> {
    let operand = operand.into_value()?;
    bytecode::describe(opcode, operand.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Kind, OpCode};

    const PUT: u8 = OpCode::Put.code();

    #[test]
    fn test_operand_conversion() {
        assert_eq!(Operand::None.into_value().unwrap(), None);
        assert_eq!(Operand::Bool(false).into_value().unwrap(), Some(Value::False));
        assert_eq!(
            Operand::Small(7.0).into_value().unwrap(),
            Some(Value::SmallNumber(7))
        );
        assert!(Operand::Small(7.5).into_value().is_err());
        assert!(matches!(
            Operand::Big("12x").into_value(),
            Err(VmError::Parse(_))
        ));
    }

    #[test]
    fn test_scalar_accessors() {
        let registry = Registry::default();
        let vm = registry.create().unwrap();
        registry.execute(vm, PUT, Operand::Number(3.5)).unwrap();

        assert_eq!(registry.type_of_top(vm).unwrap(), Kind::Number.code());
        assert_eq!(registry.top_as_text(vm).unwrap(), "3.5");
        assert_eq!(registry.top_as_double(vm).unwrap(), 3.5);
        assert!(matches!(
            registry.top_length(vm),
            Err(VmError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_map_slices() {
        let registry = Registry::default();
        let vm = registry.create().unwrap();
        registry.execute(vm, PUT, Operand::Text("k")).unwrap();
        registry.execute(vm, PUT, Operand::Small(9.0)).unwrap();
        registry
            .execute(vm, OpCode::CreateMap.code(), Operand::Small(1.0))
            .unwrap();

        assert_eq!(registry.top_length(vm).unwrap(), 1);
        assert_eq!(registry.slice_kind(vm, 0, Slot::Key).unwrap(), Kind::Text.code());
        assert_eq!(registry.slice_text(vm, 0, Slot::Key).unwrap(), "k");
        assert_eq!(registry.slice_double(vm, 0, Slot::Value).unwrap(), 9.0);
        assert_eq!(
            registry.slice_kind(vm, 1, Slot::Value),
            Err(VmError::IndexOutOfRange { index: 1, length: 1 })
        );
    }

    #[test]
    fn test_array_slices_ignore_slot() {
        let registry = Registry::default();
        let vm = registry.create().unwrap();
        registry.execute(vm, PUT, Operand::Big("1.25")).unwrap();
        registry
            .execute(vm, OpCode::CreateArray.code(), Operand::Number(1.0))
            .unwrap();

        assert_eq!(registry.slice_text(vm, 0, Slot::Key).unwrap(), "1.25");
        assert_eq!(registry.slice_text(vm, 0, Slot::Value).unwrap(), "1.25");
        assert_eq!(registry.slice_kind(vm, 0, Slot::Value).unwrap(), Kind::BigNumber.code());
    }

    #[test]
    fn test_pop_and_errors() {
        let registry = Registry::default();
        let vm = registry.create().unwrap();
        assert_eq!(
            registry.pop(vm),
            Err(VmError::StackUnderflow { needed: 1, depth: 0 })
        );
        registry.release(vm).unwrap();
        assert_eq!(registry.type_of_top(vm), Err(VmError::InvalidHandle(vm)));
        assert_eq!(
            registry.execute(vm, PUT, Operand::None),
            Err(VmError::InvalidHandle(vm))
        );
    }

    #[test]
    fn test_disassemble_operands() {
        assert_eq!(disassemble(PUT, Operand::Number(3.5)).unwrap(), "PUT number 3.5");
        assert_eq!(disassemble(PUT, Operand::Text("hi")).unwrap(), "PUT text \"hi\"");
        assert_eq!(
            disassemble(PUT, Operand::Big("123456789012345678901234567890.5")).unwrap(),
            "PUT big 123456789012345678901234567890.5"
        );
        assert_eq!(disassemble(200, Operand::None), Err(VmError::UnknownOpcode(200)));
    }

    #[test]
    fn test_global_registry() {
        let vm = create().unwrap();
        execute(vm, PUT, Operand::Bool(true)).unwrap();
        assert_eq!(type_of_top(vm).unwrap(), Kind::True.code());
        pop(vm).unwrap();
        release(vm).unwrap();
        assert_eq!(release(vm), Err(VmError::InvalidHandle(vm)));
    }
}
