//! Shared helpers for the integration suites.

// each suite uses a different subset of these helpers
#![allow(dead_code)]

use mink_asm::RawInstruction;
use mink_vm::{
    Closure, ConstantImage, Coroutine, ProgramImage, PrototypeImage, ResumeResult, Value, Vm,
    VmResult,
};

/// Build a single-prototype program image.
pub fn image(constants: Vec<ConstantImage>, instructions: Vec<RawInstruction>) -> ProgramImage {
    ProgramImage {
        constants,
        root: PrototypeImage {
            instructions,
            prototypes: vec![],
            line_info: None,
        },
        source: "test.mk".into(),
    }
}

/// Instantiate `image` against `vm` and close its root prototype over a nil
/// environment.
pub fn closure(vm: &Vm, image: &ProgramImage) -> Closure {
    let program = image.instantiate(vm).expect("program instantiates");
    Closure::from_prototype(program.root().clone(), Value::Nil)
}

/// Spawn a coroutine over `closure` and resume it once with `args`.
pub fn resume_once(vm: &Vm, closure: &Closure, args: &[Value]) -> VmResult<ResumeResult> {
    let co = vm.spawn_coroutine(closure)?;
    co.resume(vm, args)
}

/// Spawn a coroutine for repeated resumption.
pub fn spawn(vm: &Vm, closure: &Closure) -> Coroutine {
    vm.spawn_coroutine(closure).expect("coroutine spawns")
}

pub fn vm() -> Vm {
    Vm::new().expect("vm initializes")
}
