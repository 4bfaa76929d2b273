//! Stable instruction index consumed by the instrumentation passes.
//!
//! Selection tooling populates the index before any transformation runs;
//! passes only look ids up. An instruction either has no index (not a
//! target) or exactly one, and indices are never reused within a module.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::instruction::InstId;
use crate::program::Function;

/// Maps target instructions to persistent integer ids
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstIndex {
    by_inst: HashMap<InstId, i32>,
    next: i32,
}

impl InstIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next index to `inst`. Assigning twice returns the index
    /// from the first assignment.
    pub fn assign(&mut self, inst: InstId) -> i32 {
        if let Some(&index) = self.by_inst.get(&inst) {
            return index;
        }
        self.next += 1;
        self.by_inst.insert(inst, self.next);
        self.next
    }

    pub fn is_indexed(&self, inst: InstId) -> bool {
        self.by_inst.contains_key(&inst)
    }

    pub fn index_of(&self, inst: InstId) -> Option<i32> {
        self.by_inst.get(&inst).copied()
    }

    pub fn len(&self) -> usize {
        self.by_inst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_inst.is_empty()
    }
}

/// Position where synthesized instructions may be spliced into a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertPoint {
    pub block: u32,
    pub pos: usize,
}

/// Resolve where code observing `anchor`'s result may be placed.
///
/// Normally this is the position immediately after the anchor, so the
/// observed value is the post-execution value. A phi anchor resolves to
/// the first position after the block's leading phi run instead, since
/// nothing may be placed between phi nodes.
pub fn resolve_insertion_point(function: &Function, anchor: InstId) -> Option<InsertPoint> {
    let (block_idx, pos) = function.find(anchor)?;
    let block = function.get_block(block_idx as usize)?;

    let resolved = if block.instructions[pos].opcode.is_phi() {
        block
            .instructions
            .iter()
            .position(|inst| !inst.opcode.is_phi())
            .unwrap_or(block.len())
    } else {
        pos + 1
    };

    Some(InsertPoint {
        block: block_idx,
        pos: resolved,
    })
}
