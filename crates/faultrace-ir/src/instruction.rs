//! Instruction set for the instrumentation IR.

use serde::{Deserialize, Serialize};

/// Virtual register (SSA value name)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Register(pub u32);

/// Stable handle to an instruction, unique within a module.
///
/// Handles survive later insertions, so anything that must refer to an
/// instruction across passes (stable indices in particular) keys on the
/// handle rather than on a block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstId(pub u32);

/// Result/value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Void,
    /// Integer of an explicit bit width; sub-byte widths are allowed
    Int(u32),
    Float,
    Double,
    Ptr,
    /// Constant byte array of a fixed length
    Bytes(u32),
}

impl Ty {
    pub fn bit_width(&self) -> u32 {
        match self {
            Ty::Void => 0,
            Ty::Int(bits) => *bits,
            Ty::Float => 32,
            Ty::Double => 64,
            Ty::Ptr => 64,
            Ty::Bytes(len) => len * 8,
        }
    }

    /// Size in whole bytes. Widths that do not fill a byte (a 1-bit flag,
    /// a 6-bit field) still occupy one byte, so this rounds up rather
    /// than dividing.
    pub fn byte_size(&self) -> u32 {
        self.bit_width().div_ceil(8)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Ty::Void)
    }
}

/// IR Opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,
    Xor,
    Not,

    // SSA joins
    Phi,

    // Memory
    Alloca,
    Load,
    Store,

    // Calls
    Call,

    // Terminators
    Br,
    BrIf,
    Ret,
}

impl Opcode {
    /// Human-readable opcode name, as passed to the runtime tracer
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Rem => "rem",
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::Lt => "lt",
            Opcode::Le => "le",
            Opcode::Gt => "gt",
            Opcode::Ge => "ge",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Not => "not",
            Opcode::Phi => "phi",
            Opcode::Alloca => "alloca",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Call => "call",
            Opcode::Br => "br",
            Opcode::BrIf => "br_if",
            Opcode::Ret => "ret",
        }
    }

    /// Numeric opcode classification
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Returns true if this opcode transfers control out of its block
    pub fn is_terminator(&self) -> bool {
        matches!(self, Opcode::Br | Opcode::BrIf | Opcode::Ret)
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Opcode::Phi)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Register(Register),
    Imm(i64),
    /// Constant byte array (NUL-terminated name strings and the like)
    Bytes(Vec<u8>),
    Block(u32),
}

/// Call target. Calls through a register have no statically known callee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Callee {
    Direct(String),
    Indirect(Register),
}

/// A single instruction in the IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: InstId,
    pub opcode: Opcode,
    /// Result type; `Ty::Void` for instructions that produce no value.
    /// On `Alloca` this is the allocated type; the destination register
    /// holds a pointer to it.
    pub ty: Ty,
    pub dest: Option<Register>,
    pub operands: Vec<Operand>,
    pub callee: Option<Callee>,
}

impl Instruction {
    pub fn new(id: InstId, opcode: Opcode, ty: Ty) -> Self {
        Self {
            id,
            opcode,
            ty,
            dest: None,
            operands: Vec::new(),
            callee: None,
        }
    }

    pub fn with_dest(mut self, reg: Register) -> Self {
        self.dest = Some(reg);
        self
    }

    pub fn with_operand(mut self, operand: Operand) -> Self {
        self.operands.push(operand);
        self
    }

    pub fn with_callee(mut self, callee: Callee) -> Self {
        self.callee = Some(callee);
        self
    }

    /// Create a binary arithmetic/comparison/logical instruction
    pub fn arith(id: InstId, opcode: Opcode, ty: Ty, dest: Register, a: Register, b: Register) -> Self {
        Self::new(id, opcode, ty)
            .with_dest(dest)
            .with_operand(Operand::Register(a))
            .with_operand(Operand::Register(b))
    }

    /// Create a stack allocation of `ty`; `dest` holds the slot pointer
    pub fn alloca(id: InstId, ty: Ty, dest: Register) -> Self {
        Self::new(id, Opcode::Alloca, ty).with_dest(dest)
    }

    /// Create a store of `value` through the pointer in `ptr`
    pub fn store(id: InstId, value: Operand, ptr: Register) -> Self {
        Self::new(id, Opcode::Store, Ty::Void)
            .with_operand(value)
            .with_operand(Operand::Register(ptr))
    }

    /// Create a call instruction; `args` become the operand list
    pub fn call(id: InstId, callee: Callee, ty: Ty, args: Vec<Operand>) -> Self {
        let mut inst = Self::new(id, Opcode::Call, ty).with_callee(callee);
        inst.operands = args;
        inst
    }

    /// Create a phi node joining `incoming` (block, value) pairs
    pub fn phi(id: InstId, ty: Ty, dest: Register, incoming: Vec<(u32, Operand)>) -> Self {
        let mut inst = Self::new(id, Opcode::Phi, ty).with_dest(dest);
        for (block, value) in incoming {
            inst.operands.push(Operand::Block(block));
            inst.operands.push(value);
        }
        inst
    }

    /// Create an unconditional branch
    pub fn br(id: InstId, block: u32) -> Self {
        Self::new(id, Opcode::Br, Ty::Void).with_operand(Operand::Block(block))
    }

    /// Create a conditional branch
    pub fn br_if(id: InstId, condition: Register, then_block: u32, else_block: u32) -> Self {
        Self::new(id, Opcode::BrIf, Ty::Void)
            .with_operand(Operand::Register(condition))
            .with_operand(Operand::Block(then_block))
            .with_operand(Operand::Block(else_block))
    }

    /// Create a return instruction
    pub fn ret(id: InstId, value: Option<Operand>) -> Self {
        let mut inst = Self::new(id, Opcode::Ret, Ty::Void);
        if let Some(value) = value {
            inst.operands.push(value);
        }
        inst
    }

    /// Type of the value this instruction produces. An alloca's `ty`
    /// field is the allocated type; its result is the slot pointer.
    pub fn result_ty(&self) -> Ty {
        match self.opcode {
            Opcode::Alloca => Ty::Ptr,
            _ => self.ty,
        }
    }

    /// Returns true if this instruction produces a value
    pub fn produces_value(&self) -> bool {
        !self.result_ty().is_void()
    }

    /// Statically known callee name, if any
    pub fn called_name(&self) -> Option<&str> {
        match &self.callee {
            Some(Callee::Direct(name)) => Some(name.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_byte_size_rounds_up() {
        assert_eq!(Ty::Int(1).byte_size(), 1);
        assert_eq!(Ty::Int(6).byte_size(), 1);
        assert_eq!(Ty::Int(8).byte_size(), 1);
        assert_eq!(Ty::Int(9).byte_size(), 2);
        assert_eq!(Ty::Int(32).byte_size(), 4);
        assert_eq!(Ty::Int(64).byte_size(), 8);
        assert_eq!(Ty::Float.byte_size(), 4);
        assert_eq!(Ty::Double.byte_size(), 8);
    }

    #[test]
    fn test_opcode_properties() {
        assert!(Opcode::Br.is_terminator());
        assert!(Opcode::Ret.is_terminator());
        assert!(!Opcode::Add.is_terminator());

        assert!(Opcode::Phi.is_phi());
        assert!(!Opcode::Load.is_phi());

        assert_eq!(Opcode::Add.name(), "add");
        assert_eq!(Opcode::BrIf.name(), "br_if");
        assert_ne!(Opcode::Add.code(), Opcode::Sub.code());
    }

    #[test]
    fn test_instruction_builders() {
        let inst = Instruction::arith(
            InstId(0),
            Opcode::Add,
            Ty::Int(32),
            Register(0),
            Register(1),
            Register(2),
        );
        assert_eq!(inst.opcode, Opcode::Add);
        assert_eq!(inst.dest, Some(Register(0)));
        assert_eq!(inst.operands.len(), 2);
        assert!(inst.produces_value());

        let inst = Instruction::store(InstId(1), Operand::Register(Register(0)), Register(3));
        assert!(!inst.produces_value());

        // an alloca allocates its ty but produces a pointer
        let inst = Instruction::alloca(InstId(4), Ty::Int(32), Register(5));
        assert_eq!(inst.ty, Ty::Int(32));
        assert_eq!(inst.result_ty(), Ty::Ptr);
        assert!(inst.produces_value());

        let inst = Instruction::call(
            InstId(2),
            Callee::Direct("memcpy".to_string()),
            Ty::Ptr,
            vec![Operand::Register(Register(0))],
        );
        assert_eq!(inst.called_name(), Some("memcpy"));

        let inst = Instruction::call(
            InstId(3),
            Callee::Indirect(Register(7)),
            Ty::Void,
            Vec::new(),
        );
        assert_eq!(inst.called_name(), None);
    }

    proptest! {
        #[test]
        fn prop_byte_size_is_ceil_of_bits(bits in 1u32..4096) {
            let ty = Ty::Int(bits);
            prop_assert_eq!(ty.byte_size(), (bits + 7) / 8);
            prop_assert!(ty.byte_size() >= 1);
            prop_assert!(ty.byte_size() * 8 >= bits);
        }
    }
}
