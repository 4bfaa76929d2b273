//! Program structure: modules, functions, basic blocks.

use serde::{Deserialize, Serialize};

use crate::instruction::{InstId, Instruction, Register, Ty};
use faultrace_core::{Error, Result};

/// A basic block is a straight-line sequence of instructions ending in
/// exactly one terminator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
        }
    }

    pub fn with_instructions(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn push(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    /// Insert `inst` at `pos`, shifting later instructions
    pub fn insert(&mut self, pos: usize, inst: Instruction) {
        self.instructions.insert(pos, inst);
    }

    /// The block's terminator, if the block is well-formed
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions
            .last()
            .filter(|inst| inst.opcode.is_terminator())
    }

    pub fn position_of(&self, id: InstId) -> Option<usize> {
        self.instructions.iter().position(|inst| inst.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }
}

impl Default for BasicBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Declaration of an externally linked function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Ty>,
    pub ret: Ty,
}

/// A function contains multiple basic blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: String, params: Vec<Ty>, ret: Ty) -> Self {
        Self {
            name,
            params,
            ret,
            blocks: vec![BasicBlock::new()],
        }
    }

    pub fn add_block(&mut self, block: BasicBlock) -> u32 {
        self.blocks.push(block);
        (self.blocks.len() - 1) as u32
    }

    pub fn get_block(&self, index: usize) -> Option<&BasicBlock> {
        self.blocks.get(index)
    }

    pub fn get_block_mut(&mut self, index: usize) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(index)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Count total instructions in the function
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    /// Iterate instructions with their (block, position) coordinates
    pub fn iter_instructions(&self) -> impl Iterator<Item = (u32, usize, &Instruction)> {
        self.blocks.iter().enumerate().flat_map(|(b, block)| {
            block
                .instructions
                .iter()
                .enumerate()
                .map(move |(pos, inst)| (b as u32, pos, inst))
        })
    }

    /// Locate an instruction by handle
    pub fn find(&self, id: InstId) -> Option<(u32, usize)> {
        self.iter_instructions()
            .find(|(_, _, inst)| inst.id == id)
            .map(|(b, pos, _)| (b, pos))
    }
}

/// A complete compilation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    /// Externally linked functions referenced by call sites
    pub declarations: Vec<FuncDecl>,
    next_inst: u32,
    next_reg: u32,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            declarations: Vec::new(),
            next_inst: 0,
            next_reg: 0,
        }
    }

    /// Add a function, bumping the fresh-id allocators past any handle or
    /// register it already uses so later allocations never collide
    pub fn add_function(&mut self, function: Function) -> u32 {
        for (_, _, inst) in function.iter_instructions() {
            self.next_inst = self.next_inst.max(inst.id.0 + 1);
            if let Some(Register(r)) = inst.dest {
                self.next_reg = self.next_reg.max(r + 1);
            }
        }
        self.functions.push(function);
        (self.functions.len() - 1) as u32
    }

    pub fn get_function(&self, index: usize) -> Option<&Function> {
        self.functions.get(index)
    }

    pub fn get_function_mut(&mut self, index: usize) -> Option<&mut Function> {
        self.functions.get_mut(index)
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    /// Allocate an instruction handle unused anywhere in the module
    pub fn fresh_inst_id(&mut self) -> InstId {
        let id = InstId(self.next_inst);
        self.next_inst += 1;
        id
    }

    /// Allocate a register unused anywhere in the module
    pub fn fresh_register(&mut self) -> Register {
        let reg = Register(self.next_reg);
        self.next_reg += 1;
        reg
    }

    /// Get-or-insert a declaration of an externally linked function.
    ///
    /// Declaring the same name with the same signature again is a no-op;
    /// a different signature under an existing name is a configuration
    /// error and leaves the declaration table unchanged.
    pub fn declare_external(&mut self, name: &str, params: Vec<Ty>, ret: Ty) -> Result<()> {
        if let Some(existing) = self.declarations.iter().find(|d| d.name == name) {
            if existing.params == params && existing.ret == ret {
                return Ok(());
            }
            return Err(Error::DeclarationMismatch(name.to_string()));
        }
        self.declarations.push(FuncDecl {
            name: name.to_string(),
            params,
            ret,
        });
        Ok(())
    }

    pub fn get_declaration(&self, name: &str) -> Option<&FuncDecl> {
        self.declarations.iter().find(|d| d.name == name)
    }

    /// Count total instructions in the module
    pub fn total_instructions(&self) -> usize {
        self.functions.iter().map(|f| f.instruction_count()).sum()
    }

    /// Serialize the module to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a module from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Opcode, Operand};

    fn add_and_ret(module: &mut Module) -> Function {
        let mut func = Function::new("f".to_string(), vec![Ty::Int(32); 2], Ty::Int(32));
        let block = func.get_block_mut(0).unwrap();
        block.push(Instruction::arith(
            module.fresh_inst_id(),
            Opcode::Add,
            Ty::Int(32),
            Register(2),
            Register(0),
            Register(1),
        ));
        block.push(Instruction::ret(
            module.fresh_inst_id(),
            Some(Operand::Register(Register(2))),
        ));
        func
    }

    #[test]
    fn test_basic_block() {
        let mut block = BasicBlock::new();
        assert!(block.is_empty());
        assert!(block.terminator().is_none());

        block.push(Instruction::ret(InstId(0), None));
        assert_eq!(block.len(), 1);
        assert!(block.terminator().is_some());
        assert_eq!(block.position_of(InstId(0)), Some(0));
    }

    #[test]
    fn test_function_coordinates() {
        let mut module = Module::new("m");
        let func = add_and_ret(&mut module);
        assert_eq!(func.instruction_count(), 2);

        let add_id = func.blocks[0].instructions[0].id;
        assert_eq!(func.find(add_id), Some((0, 0)));
        assert_eq!(func.find(InstId(999)), None);
    }

    #[test]
    fn test_fresh_ids_skip_absorbed_function() {
        let mut module = Module::new("m");
        let mut func = Function::new("f".to_string(), Vec::new(), Ty::Void);
        func.get_block_mut(0).unwrap().push(
            Instruction::new(InstId(41), Opcode::Load, Ty::Int(32)).with_dest(Register(9)),
        );
        func.get_block_mut(0)
            .unwrap()
            .push(Instruction::ret(InstId(42), None));
        module.add_function(func);

        assert!(module.fresh_inst_id() > InstId(42));
        assert_eq!(module.fresh_register(), Register(10));
    }

    #[test]
    fn test_declare_external_idempotent() {
        let mut module = Module::new("m");
        module
            .declare_external("tracer", vec![Ty::Int(32), Ty::Ptr], Ty::Void)
            .unwrap();
        module
            .declare_external("tracer", vec![Ty::Int(32), Ty::Ptr], Ty::Void)
            .unwrap();
        assert_eq!(module.declarations.len(), 1);

        let err = module
            .declare_external("tracer", vec![Ty::Int(64)], Ty::Void)
            .unwrap_err();
        assert!(matches!(err, Error::DeclarationMismatch(_)));
        assert_eq!(module.declarations.len(), 1);
    }

    #[test]
    fn test_module_serialization() {
        let mut module = Module::new("m");
        let func = add_and_ret(&mut module);
        module.add_function(func);
        module
            .declare_external("tracer", vec![Ty::Int(32)], Ty::Void)
            .unwrap();

        let bytes = module.to_bytes().unwrap();
        let deserialized = Module::from_bytes(&bytes).unwrap();
        assert_eq!(deserialized.total_instructions(), module.total_instructions());
        assert_eq!(deserialized.declarations.len(), 1);
    }
}
