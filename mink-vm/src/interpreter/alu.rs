//! Arithmetic and comparison executors.

use mink_asm::{Flags, Instruction, Opcode, RawInstruction};

use crate::call::{CallBody, CallState};
use crate::error::VmResult;
use crate::value::{arith, ArithOp};

use super::Executor;

impl Executor<'_> {
    pub(super) fn arith_step(
        &self,
        frame: &CallState,
        body: &mut CallBody,
        ins: &Instruction,
        opcode: Opcode,
        raw: RawInstruction,
    ) -> VmResult<()> {
        let op = match opcode {
            Opcode::Add => ArithOp::Add,
            Opcode::Sub => ArithOp::Sub,
            Opcode::Mul => ArithOp::Mul,
            Opcode::Div => ArithOp::Div,
            Opcode::Mod => ArithOp::Mod,
            _ => ArithOp::Pow,
        };
        let lhs = self.read_reg(body, frame, ins.b(), raw)?;
        let rhs = self.read_reg(body, frame, ins.c(), raw)?;
        let result = arith(op, &lhs, &rhs)?;
        self.write_reg(body, ins.a(), result, raw)
    }

    /// `CMP`: `EQUAL` from total equality, `LESS` from numeric ordering.
    /// An unorderable pair leaves `LESS` clear rather than raising.
    pub(super) fn compare_step(
        &self,
        frame: &CallState,
        body: &mut CallBody,
        ins: &Instruction,
        raw: RawInstruction,
    ) -> VmResult<()> {
        let lhs = self.read_reg(body, frame, ins.a(), raw)?;
        let rhs = self.read_reg(body, frame, ins.b(), raw)?;

        let mut flags = Flags::empty();
        if lhs == rhs {
            flags |= Flags::EQUAL;
        }
        if lhs.partial_lt(&rhs) == Some(true) {
            flags |= Flags::LESS;
        }
        body.set_flags(flags);
        Ok(())
    }
}
