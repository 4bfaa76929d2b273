//! Built-in instruction selectors.

use faultrace_ir::{Instruction, Module, Opcode};

use crate::selector::{ClassificationLog, Selector};

/// Selects block-copy calls as buffer-overflow fault targets.
///
/// Only calls whose callee is statically known count; a call through a
/// register can never match the allow-list and is never a target.
pub struct MemCopyOverflowSelector;

impl MemCopyOverflowSelector {
    /// Pass name this selector registers under
    pub const NAME: &'static str = "buffer-overflow-memcpy";
    /// Fault category recorded for downstream tooling
    pub const CATEGORY: &'static str = "mem-buffer-overflow";

    const TARGET_CALLEES: [&'static str; 2] = ["memcpy", "memmove"];
}

impl Selector for MemCopyOverflowSelector {
    fn classify(&self, _module: &Module, inst: &Instruction, log: &mut ClassificationLog) -> bool {
        if inst.opcode != Opcode::Call {
            return false;
        }
        match inst.called_name() {
            Some(name) if Self::TARGET_CALLEES.contains(&name) => {
                log.record(Self::NAME, Self::CATEGORY);
                true
            }
            _ => false,
        }
    }
}
