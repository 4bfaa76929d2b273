//! Trace-injection pass.
//!
//! Rewrites each function so that every indexed, value-producing,
//! non-terminator instruction is followed by a call into the external
//! runtime tracer: stack slots are synthesized for the instruction's
//! value, the configured output filename, and the opcode name, and the
//! tracer is called with the instruction's stable index, those slots,
//! the value size in bytes, and the trace budget. The tracer body is
//! linked in later; only its declaration and call sites are created here.

use std::collections::BTreeMap;

use tracing::debug;

use faultrace_core::{Error, Result, TraceConfig};
use faultrace_ir::{
    resolve_insertion_point, Callee, Function, InsertPoint, InstIndex, Instruction, Module,
    Operand, Register, Ty,
};

/// Runtime tracer symbol the instrumented program links against
pub const TRACER_SYMBOL: &str = "printInstTracer";

/// One instrumentation site, resolved before any mutation happens
struct PlannedSite {
    point: InsertPoint,
    index: i32,
    dest: Register,
    ty: Ty,
    opcode_name: &'static str,
}

pub struct TraceInjector {
    config: TraceConfig,
    /// Output filename captured once for the pass's lifetime,
    /// NUL-terminated for the runtime's C-string contract
    filename: Vec<u8>,
}

impl TraceInjector {
    pub fn new(config: TraceConfig) -> Self {
        let mut filename = config.output_filename.clone().into_bytes();
        filename.push(0);
        Self { config, filename }
    }

    /// Instrument every function in the module. Returns whether the
    /// module changed.
    pub fn instrument_module(&self, module: &mut Module, index: &InstIndex) -> Result<bool> {
        let mut changed = false;
        for func_idx in 0..module.functions.len() {
            changed |= self.instrument_function(module, func_idx, index)?;
        }
        Ok(changed)
    }

    /// Instrument one function. Eligibility and insertion points are
    /// resolved for the whole function before the first splice, so a
    /// failure never leaves the function half-instrumented.
    pub fn instrument_function(
        &self,
        module: &mut Module,
        func_idx: usize,
        index: &InstIndex,
    ) -> Result<bool> {
        let function = module
            .get_function(func_idx)
            .ok_or_else(|| Error::Validation(format!("No function at index {}", func_idx)))?;
        let sites = self.plan_function(function, index)?;
        if sites.is_empty() {
            return Ok(false);
        }

        if self.config.verbose {
            debug!(
                function = %function.name,
                sites = sites.len(),
                "injecting trace calls"
            );
        }

        // The declaration only exists in modules that actually call it
        self.declare_tracer(module)?;

        // Synthesize every sequence first (needs the module's fresh-id
        // allocators). Sequences sharing an insertion point (several phi
        // anchors resolving past the same phi run) are concatenated in
        // anchor order, then points are spliced in descending order so
        // earlier points stay valid.
        let mut splices: BTreeMap<(u32, usize), Vec<Instruction>> = BTreeMap::new();
        for site in &sites {
            let seq = self.synthesize(module, site);
            splices
                .entry((site.point.block, site.point.pos))
                .or_default()
                .extend(seq);
        }

        let function = module
            .get_function_mut(func_idx)
            .ok_or_else(|| Error::Validation(format!("No function at index {}", func_idx)))?;
        for ((block_idx, pos), seq) in splices.into_iter().rev() {
            let block = function
                .get_block_mut(block_idx as usize)
                .ok_or_else(|| Error::Validation(format!("No block {}", block_idx)))?;
            block.instructions.splice(pos..pos, seq);
        }

        Ok(true)
    }

    /// Collect every eligible instruction's site: non-void result,
    /// indexed, and not its block's terminator. Phi anchors resolve to
    /// the position after the block's leading phi run.
    fn plan_function(&self, function: &Function, index: &InstIndex) -> Result<Vec<PlannedSite>> {
        let mut sites = Vec::new();
        for (_, _, inst) in function.iter_instructions() {
            if self.config.verbose {
                if index.is_indexed(inst.id) {
                    debug!(
                        function = %function.name,
                        opcode = inst.opcode.name(),
                        code = inst.opcode.code(),
                        "found indexed instruction"
                    );
                } else {
                    debug!(function = %function.name, "instruction not indexed");
                }
            }

            if !inst.produces_value()
                || !index.is_indexed(inst.id)
                || inst.opcode.is_terminator()
            {
                continue;
            }

            let stable_index = index.index_of(inst.id).ok_or_else(|| {
                Error::MissingIndex(format!(
                    "{} instruction in function {}",
                    inst.opcode.name(),
                    function.name
                ))
            })?;
            let dest = inst.dest.ok_or_else(|| {
                Error::Validation(format!(
                    "Value-producing {} instruction in function {} has no destination",
                    inst.opcode.name(),
                    function.name
                ))
            })?;
            let point = resolve_insertion_point(function, inst.id).ok_or_else(|| {
                Error::Validation(format!(
                    "No insertion point for instruction in function {}",
                    function.name
                ))
            })?;

            sites.push(PlannedSite {
                point,
                index: stable_index,
                dest,
                ty: inst.result_ty(),
                opcode_name: inst.opcode.name(),
            });
        }
        Ok(sites)
    }

    /// Build the instruction sequence for one site: a slot holding the
    /// traced value, a slot holding the output filename, a slot holding
    /// the opcode name, then the six-argument tracer call.
    fn synthesize(&self, module: &mut Module, site: &PlannedSite) -> Vec<Instruction> {
        let value_slot = module.fresh_register();
        let file_slot = module.fresh_register();
        let opcode_slot = module.fresh_register();

        let mut opcode_name = site.opcode_name.as_bytes().to_vec();
        opcode_name.push(0);

        let mut seq = Vec::with_capacity(7);
        seq.push(Instruction::alloca(module.fresh_inst_id(), site.ty, value_slot));
        seq.push(Instruction::store(
            module.fresh_inst_id(),
            Operand::Register(site.dest),
            value_slot,
        ));
        seq.push(Instruction::alloca(
            module.fresh_inst_id(),
            Ty::Bytes(self.filename.len() as u32),
            file_slot,
        ));
        seq.push(Instruction::store(
            module.fresh_inst_id(),
            Operand::Bytes(self.filename.clone()),
            file_slot,
        ));
        seq.push(Instruction::alloca(
            module.fresh_inst_id(),
            Ty::Bytes(opcode_name.len() as u32),
            opcode_slot,
        ));
        seq.push(Instruction::store(
            module.fresh_inst_id(),
            Operand::Bytes(opcode_name),
            opcode_slot,
        ));
        seq.push(Instruction::call(
            module.fresh_inst_id(),
            Callee::Direct(TRACER_SYMBOL.to_string()),
            Ty::Void,
            vec![
                Operand::Imm(site.index as i64),
                Operand::Register(opcode_slot),
                Operand::Imm(site.ty.byte_size() as i64),
                Operand::Register(value_slot),
                Operand::Register(file_slot),
                Operand::Imm(self.config.trace_budget as i64),
            ],
        ));
        seq
    }

    fn declare_tracer(&self, module: &mut Module) -> Result<()> {
        module.declare_external(
            TRACER_SYMBOL,
            vec![Ty::Int(32), Ty::Ptr, Ty::Int(32), Ty::Ptr, Ty::Ptr, Ty::Int(32)],
            Ty::Void,
        )
    }
}
