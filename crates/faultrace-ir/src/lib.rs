//! Intermediate representation for instrumented programs.
//!
//! This module defines the typed, instruction-level program representation
//! the fault-injection passes operate on. The IR is designed to be:
//! - Transformable: instructions are spliced in place while block
//!   terminator and phi-placement invariants hold
//! - Addressable: every instruction carries a handle that stays valid
//!   across later insertions
//! - Compact: programs round-trip through bincode for storage

pub mod index;
pub mod instruction;
pub mod program;
pub mod validation;

pub use index::{resolve_insertion_point, InsertPoint, InstIndex};
pub use instruction::{Callee, InstId, Instruction, Opcode, Operand, Register, Ty};
pub use program::{BasicBlock, FuncDecl, Function, Module};
pub use validation::validate_module;
