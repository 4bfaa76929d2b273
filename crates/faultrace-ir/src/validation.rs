//! Structural validation for IR modules.

use std::collections::HashSet;

use crate::program::{Function, Module};
use crate::instruction::Opcode;
use faultrace_core::{Error, Result};

/// Validate that a module is well-formed
pub fn validate_module(module: &Module) -> Result<()> {
    let mut seen = HashSet::new();
    for (idx, func) in module.functions.iter().enumerate() {
        validate_function(func, idx)?;
        for (_, _, inst) in func.iter_instructions() {
            if !seen.insert(inst.id) {
                return Err(Error::Validation(format!(
                    "Duplicate instruction handle {:?} in function {}",
                    inst.id, idx
                )));
            }
        }
    }
    Ok(())
}

fn validate_function(func: &Function, idx: usize) -> Result<()> {
    if func.blocks.is_empty() {
        return Err(Error::Validation(format!(
            "Function {} has no basic blocks",
            idx
        )));
    }

    for (block_idx, block) in func.blocks.iter().enumerate() {
        if block.is_empty() {
            return Err(Error::Validation(format!(
                "Function {} block {} is empty",
                idx, block_idx
            )));
        }

        if block.terminator().is_none() {
            return Err(Error::Validation(format!(
                "Function {} block {} does not end in a terminator",
                idx, block_idx
            )));
        }

        let mut past_phis = false;
        for (pos, inst) in block.instructions.iter().enumerate() {
            if inst.opcode.is_terminator() && pos + 1 != block.len() {
                return Err(Error::Validation(format!(
                    "Function {} block {} has a terminator before its end",
                    idx, block_idx
                )));
            }
            if inst.opcode.is_phi() {
                if past_phis {
                    return Err(Error::Validation(format!(
                        "Function {} block {} has a phi outside the leading phi run",
                        idx, block_idx
                    )));
                }
            } else {
                past_phis = true;
            }
            if inst.opcode == Opcode::Call && inst.callee.is_none() {
                return Err(Error::Validation(format!(
                    "Function {} block {} has a call without a callee",
                    idx, block_idx
                )));
            }
        }
    }

    Ok(())
}
