//! The fetch-decode-execute loop and the call protocol.

use std::sync::Arc;

use mink_asm::{Instruction, Opcode, RawInstruction, RegisterId};

use crate::bytecode::Prototype;
use crate::call::{CallBody, CallState};
use crate::coroutine::Coroutine;
use crate::error::{Fault, VmResult};
use crate::state::ExecuteState;
use crate::value::Value;
use crate::vm::Vm;

mod alu;
mod flow;

pub(crate) use flow::Arity;

/// Executes frames of one coroutine against a VM.
pub(crate) struct Executor<'vm> {
    vm: &'vm Vm,
    co: Coroutine,
}

impl<'vm> Executor<'vm> {
    pub(crate) fn new(vm: &'vm Vm, co: Coroutine) -> Self {
        Executor { vm, co }
    }

    /// Run the body bound to `frame` to completion and return its result
    /// arity: the number of top stack slots holding results.
    pub(crate) fn run_frame(&self, frame: &CallState) -> VmResult<usize> {
        let closure = frame.closure().clone();
        if let Some((func, data)) = closure.native() {
            let arity = func(self.vm, data)?;
            if arity > frame.stack_top() {
                return Err(Fault::StackUnderflow.into());
            }
            return Ok(arity);
        }
        // non-native closures always carry a prototype
        let Some(prototype) = closure.prototype().cloned() else {
            return Err(Fault::NotCallable("function").into());
        };
        self.exec_loop(frame, prototype)
    }

    fn exec_loop(&self, frame: &CallState, prototype: Arc<Prototype>) -> VmResult<usize> {
        let instructions = prototype.instructions();
        let mut body = frame.lock_body();
        let mut pc = 0usize;

        while pc < instructions.len() {
            let raw = instructions[pc];
            let decoded = Instruction::decode(&instructions[pc..])
                .map_err(|err| Fault::IllegalInstruction(err.word()))?;

            if decoded.instruction.cond().is_satisfied(body.flags()) {
                tracing::trace!(pc, op = %decoded.opcode, "exec");
                let state = self.step(
                    frame,
                    &mut body,
                    &prototype,
                    &decoded.instruction,
                    decoded.opcode,
                    raw,
                    pc,
                    instructions.len(),
                )?;
                match state {
                    ExecuteState::Proceed => pc += decoded.width,
                    ExecuteState::Jump(target) => pc = target,
                    ExecuteState::Return(arity) => {
                        frame.set_pc(pc);
                        return Ok(arity);
                    }
                }
            } else {
                pc += decoded.width;
            }
            frame.set_pc(pc);
        }

        // fell off the end of the instruction vector: return with no values
        Ok(0)
    }

    #[allow(clippy::too_many_arguments)]
    fn step(
        &self,
        frame: &CallState,
        body: &mut CallBody,
        prototype: &Prototype,
        ins: &Instruction,
        opcode: Opcode,
        raw: RawInstruction,
        pc: usize,
        len: usize,
    ) -> VmResult<ExecuteState> {
        match opcode {
            Opcode::Nop => {}
            Opcode::Mov => {
                let value = self.read_reg(body, frame, ins.b(), raw)?;
                self.write_reg(body, ins.a(), value, raw)?;
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Pow => {
                self.arith_step(frame, body, ins, opcode, raw)?;
            }
            Opcode::Cmp => {
                self.compare_step(frame, body, ins, raw)?;
            }
            Opcode::JmpForward => {
                let target = pc + ins.a() as usize;
                if target >= len {
                    return Err(Fault::JumpOutOfRange {
                        target: target as i64,
                        len,
                    }
                    .into());
                }
                return Ok(ExecuteState::Jump(target));
            }
            Opcode::JmpBackward => {
                let target = pc as i64 - i64::from(ins.a());
                if target < 0 {
                    return Err(Fault::JumpOutOfRange { target, len }.into());
                }
                return Ok(ExecuteState::Jump(target as usize));
            }
            Opcode::LoadPrototype => {
                let Some(child) = prototype.child(ins.b() as usize) else {
                    return Err(Fault::IllegalInstruction(raw).into());
                };
                let env = frame.closure().env().clone();
                let closure = crate::closure::Closure::from_prototype(child.clone(), env);
                self.write_reg(body, ins.a(), closure.as_value(), raw)?;
            }
            Opcode::GetConstant => {
                let Some(constant) = prototype.constant(ins.b() as usize).cloned() else {
                    return Err(Fault::IllegalInstruction(raw).into());
                };
                self.write_reg(body, ins.a(), constant, raw)?;
            }
            Opcode::StackGetTop => {
                let top = body.top() as i64 - 1;
                self.write_reg(body, ins.a(), Value::Long(top), raw)?;
            }
            Opcode::StackPush => {
                let value = self.read_reg(body, frame, ins.a(), raw)?;
                body.push(self.vm.heap(), value)?;
            }
            Opcode::StackPop => {
                let value = body.pop(self.vm.heap())?;
                self.write_reg(body, ins.a(), value, raw)?;
            }
            Opcode::TableGet => {
                let table = self.read_reg(body, frame, ins.b(), raw)?;
                let key = self.read_reg(body, frame, ins.c(), raw)?;
                let Value::Table(table) = table else {
                    return Err(Fault::NotIndexable(table.type_name()).into());
                };
                let value = table.get(&key).unwrap_or(Value::Nil);
                self.write_reg(body, ins.a(), value, raw)?;
            }
            Opcode::TableSet => {
                let table = self.read_reg(body, frame, ins.a(), raw)?;
                let key = self.read_reg(body, frame, ins.b(), raw)?;
                let value = self.read_reg(body, frame, ins.c(), raw)?;
                let Value::Table(table) = table else {
                    return Err(Fault::NotIndexable(table.type_name()).into());
                };
                table.set(key, value)?;
            }
            Opcode::Call => {
                let callee = self.read_reg(body, frame, ins.a(), raw)?;
                let results = Arity::from_field(ins.b());
                let args = Arity::from_field(ins.c());
                self.call_value(frame, body, callee, args, results)?;
            }
            Opcode::Return => {
                let arity = ins.b() as usize;
                for offset in 0..arity {
                    let Some(index) = ins.a().checked_add(offset as RegisterId) else {
                        return Err(Fault::IllegalInstruction(raw).into());
                    };
                    let value = self.read_reg(body, frame, index, raw)?;
                    body.push(self.vm.heap(), value)?;
                }
                return Ok(ExecuteState::Return(arity));
            }
            // the decoder rejects extension words as primaries
            Opcode::Extra => return Err(Fault::IllegalInstruction(raw).into()),
        }
        Ok(ExecuteState::Proceed)
    }

    fn read_reg(
        &self,
        body: &CallBody,
        frame: &CallState,
        index: RegisterId,
        raw: RawInstruction,
    ) -> VmResult<Value> {
        body.register(frame.closure(), index)
            .map_err(|_| Fault::IllegalInstruction(raw).into())
    }

    fn write_reg(
        &self,
        body: &mut CallBody,
        index: RegisterId,
        value: Value,
        raw: RawInstruction,
    ) -> VmResult<()> {
        body.set_register(self.vm.heap(), index, value)
            .map_err(|_| Fault::IllegalInstruction(raw).into())
    }
}

/// Run a coroutine's entry frame: deliver the pending transfer values as
/// stack arguments, execute the closure, and collect its results.
pub(crate) fn run_coroutine_body(vm: &Vm, co: &Coroutine) -> VmResult<Vec<Value>> {
    let frame = co.current_frame().ok_or(Fault::StackUnderflow)?;
    let args = co.take_transfer();
    {
        let mut body = frame.lock_body();
        for value in args {
            body.push(vm.heap(), value)?;
        }
    }

    let executor = Executor::new(vm, co.clone());
    let arity = executor.run_frame(&frame)?;

    let body = frame.lock_body();
    Ok(body.top_slice(arity.min(body.top())))
}
