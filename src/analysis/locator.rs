use tracing::trace;

use crate::code_attribute::{FlowControl, Instruction, OpCode};
use crate::error::{Error, Result};

use super::stack_calc::{consumed_from_stack_by, produced_to_stack_by};

/// Walks a linear instruction sequence backwards, counting stack slots, to
/// find the instruction that pushed a given operand.
pub struct Locator<'a> {
    instructions: &'a [Instruction],
    max_depth: usize,
}

impl<'a> Locator<'a> {
    pub fn new(instructions: &'a [Instruction], max_depth: usize) -> Self {
        Locator {
            instructions,
            max_depth,
        }
    }

    /// Find the producer of the slot lying `slots` values below the stack top
    /// as seen by the instruction at `start`. With `is_outermost` set the
    /// walk stops on the first member-referencing producer of that slot
    /// instead of unwinding its inputs.
    pub fn locate(&self, start: usize, is_outermost: bool, slots: usize) -> Result<usize> {
        if start > self.instructions.len() {
            return Err(Error::InstructionOutOfRange {
                index: start,
                len: self.instructions.len(),
            });
        }
        self.walk(start, is_outermost, slots, 0)
    }

    fn walk(&self, start: usize, is_outermost: bool, mut slots: usize, depth: usize) -> Result<usize> {
        if slots > 0 && depth > self.max_depth {
            return Err(Error::NestingTooDeep { depth: self.max_depth });
        }

        let mut idx = start;
        while slots > 0 {
            idx = self.previous_skipping_prefixes(idx, start, slots)?;

            while self.is_flow_artifact(idx) {
                idx = self.previous(idx, start, slots)?;
            }

            if self.instructions[idx].opcode.flow_control() == FlowControl::Branch {
                idx = self.join_origin(idx, start, slots)?;
            }

            slots -= 1;
            let instr = &self.instructions[idx];
            let produced = produced_to_stack_by(instr);
            if produced == 0 {
                slots += 1;
            }
            trace!(depth, slots, "{}", instr);

            if is_outermost && slots == 0 && instr.operand.is_member_reference() {
                break;
            }

            // The producer pops its own inputs first; walk over them.
            let mut consumed = consumed_from_stack_by(instr);
            if produced > 1 {
                consumed = consumed.saturating_sub(produced - 1);
            }
            idx = self.walk(idx, is_outermost && slots == 0, consumed, depth + 1)?;
        }
        Ok(idx)
    }

    /// `br` to the very next instruction, or `nop`.
    fn is_flow_artifact(&self, idx: usize) -> bool {
        let instr = &self.instructions[idx];
        instr.opcode == OpCode::Nop
            || (instr.opcode.flow_control() == FlowControl::Branch && instr.branch_target() == Some(idx + 1))
    }

    /// `branch` closes one arm of a conditional expression. The other arm
    /// starts right after it, and the conditional branch jumping there opened
    /// the construct. Only the arm already walked is taken into account:
    /// both arms of a well-typed conditional push the same declared type.
    fn join_origin(&self, branch: usize, start: usize, slots: usize) -> Result<usize> {
        let other_arm = branch + 1;
        let mut idx = branch;
        loop {
            idx = self.previous(idx, start, slots)?;
            if self.instructions[idx].branch_target() == Some(other_arm) {
                break;
            }
        }
        trace!(branch, origin = idx, "conditional join");

        if self.instructions[idx].opcode.flow_control() == FlowControl::Branch {
            idx = self.previous(idx, start, slots)?;
        }
        Ok(idx)
    }

    fn previous(&self, idx: usize, start: usize, slots: usize) -> Result<usize> {
        idx.checked_sub(1).ok_or(Error::SequenceExhausted {
            start,
            remaining: slots,
        })
    }

    fn previous_skipping_prefixes(&self, mut idx: usize, start: usize, slots: usize) -> Result<usize> {
        loop {
            idx = self.previous(idx, start, slots)?;
            if !self.instructions[idx].opcode.is_prefix() {
                return Ok(idx);
            }
        }
    }
}
