//! Coroutine scheduling: resume/yield, error capture, yield gating.

use std::sync::{Arc, Mutex};

use mink_asm::op;
use mink_vm::{
    Closure, ConstantImage, Coroutine, Fault, FiberState, NativeData, Value, Vm, VmError, VmResult,
};

mod common;

use common::{closure, image, spawn, vm};

type Log = Arc<Mutex<Vec<String>>>;

fn log_of(data: Option<&NativeData>) -> Log {
    data.and_then(|d| d.downcast_ref::<Log>())
        .cloned()
        .expect("log side channel")
}

fn current(vm: &Vm) -> Coroutine {
    vm.current_coroutine().expect("running inside a coroutine")
}

fn yield_once_then_return_nine(vm: &Vm, _data: Option<&NativeData>) -> VmResult<usize> {
    vm.yield_values(vec![Value::Long(7)])?;
    let co = current(vm);
    vm.stack_of(&co).push_long(9)?;
    Ok(1)
}

#[test]
fn one_shot_yield_body_suspends_then_dies() {
    let vm = vm();
    let body = Closure::from_native(yield_once_then_return_nine, None, Value::Nil);
    let co = spawn(&vm, &body);

    assert_eq!(co.state(), FiberState::Suspended);

    let first = co.resume(&vm, &[]).expect("first resume");
    assert_eq!(first.values, vec![Value::Long(7)]);
    assert_eq!(first.state, FiberState::Suspended);

    let second = co.resume(&vm, &[]).expect("second resume");
    assert_eq!(second.values, vec![Value::Long(9)]);
    assert_eq!(second.state, FiberState::Dead);
    assert!(second.is_finished());

    let third = co.resume(&vm, &[]).unwrap_err();
    assert!(matches!(
        third.fault(),
        Some(Fault::CoroutineState(
            mink_vm::CoroutineFault::ResumeDead
        ))
    ));
}

fn ping(vm: &Vm, data: Option<&NativeData>) -> VmResult<usize> {
    let peer = data
        .and_then(|d| d.downcast_ref::<PingData>())
        .expect("peer side channel");
    let log = &peer.log;

    let first = peer.pong.resume(vm, &[])?;
    log.lock().expect("log").push(format!(
        "resume #1 -> {:?} ({})",
        first.values,
        if first.is_finished() { "dead" } else { "suspended" }
    ));

    let second = peer.pong.resume(vm, &[])?;
    log.lock().expect("log").push(format!(
        "resume #2 -> {:?} ({})",
        second.values,
        if second.is_finished() { "dead" } else { "suspended" }
    ));
    Ok(0)
}

struct PingData {
    pong: Coroutine,
    log: Log,
}

#[test]
fn coroutine_ping_pong_transfers_values_both_ways() {
    let vm = vm();
    let pong_body = Closure::from_native(yield_once_then_return_nine, None, Value::Nil);
    let pong = spawn(&vm, &pong_body);

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let ping_body = Closure::from_native(
        ping,
        Some(NativeData::new(PingData {
            pong,
            log: log.clone(),
        })),
        Value::Nil,
    );
    let ping = spawn(&vm, &ping_body);

    let result = ping.resume(&vm, &[]).expect("ping runs to completion");
    assert!(result.is_finished());

    let entries = log.lock().expect("log").clone();
    assert_eq!(
        entries,
        vec![
            "resume #1 -> [Long(7)] (suspended)".to_string(),
            "resume #2 -> [Long(9)] (dead)".to_string(),
        ]
    );
}

#[test]
fn resume_arguments_reach_the_entry_frame() {
    let vm = vm();
    // entry: pop the two stack arguments, add them, return the sum
    let program = image(
        vec![],
        vec![
            op::stack_pop(0),
            op::stack_pop(1),
            op::add(2, 0, 1),
            op::ret(2, 1),
        ],
    );
    let co = spawn(&vm, &closure(&vm, &program));
    let result = co
        .resume(&vm, &[Value::Long(30), Value::Long(12)])
        .expect("resume");
    assert_eq!(result.values, vec![Value::Long(42)]);
}

fn observe_yield_results(vm: &Vm, data: Option<&NativeData>) -> VmResult<usize> {
    let log = log_of(data);
    let resumed_with = vm.yield_values(vec![Value::Long(1)])?;
    log.lock().expect("log").push(format!("{resumed_with:?}"));
    Ok(0)
}

#[test]
fn second_resume_arguments_become_yield_results() {
    let vm = vm();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let body = Closure::from_native(
        observe_yield_results,
        Some(NativeData::new(log.clone())),
        Value::Nil,
    );
    let co = spawn(&vm, &body);

    co.resume(&vm, &[]).expect("first resume");
    co.resume(&vm, &[Value::Bool(true), Value::Long(5)])
        .expect("second resume");

    assert_eq!(
        log.lock().expect("log").clone(),
        vec!["[Bool(true), Long(5)]".to_string()]
    );
}

#[test]
fn yield_outside_any_coroutine_is_a_state_error() {
    let vm = vm();
    let err = vm.yield_values(vec![]).unwrap_err();
    assert!(matches!(
        err.fault(),
        Some(Fault::CoroutineState(
            mink_vm::CoroutineFault::YieldOutside
        ))
    ));
}

fn yield_after_disallow(vm: &Vm, data: Option<&NativeData>) -> VmResult<usize> {
    let log = log_of(data);
    vm.disallow_yield();
    match vm.yield_values(vec![Value::Long(1)]) {
        Ok(_) => log.lock().expect("log").push("yield succeeded".into()),
        Err(err) => log.lock().expect("log").push(err.to_string()),
    }
    vm.allow_yield();
    Ok(0)
}

#[test]
fn non_yieldable_coroutine_fails_yield_without_suspending() {
    let vm = vm();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let body = Closure::from_native(
        yield_after_disallow,
        Some(NativeData::new(log.clone())),
        Value::Nil,
    );
    let co = spawn(&vm, &body);

    // one resume reaches completion: the failed yield never suspended
    let result = co.resume(&vm, &[]).expect("resume");
    assert!(result.is_finished());
    assert_eq!(
        log.lock().expect("log").clone(),
        vec!["attempt to yield across a yield-disabled boundary".to_string()]
    );
}

fn raise_boom(vm: &Vm, _data: Option<&NativeData>) -> VmResult<usize> {
    Err(VmError::Raised(vm.new_string(b"boom")?))
}

#[test]
fn escaped_errors_land_in_the_thrown_error_slot() {
    let vm = vm();
    let body = Closure::from_native(raise_boom, None, Value::Nil);
    let co = spawn(&vm, &body);

    let err = co.resume(&vm, &[]).unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert!(co.has_error());
    assert_eq!(co.thrown_error().map(|v| v.to_string()), Some("boom".into()));
    assert_eq!(co.state(), FiberState::Dead);
    // frames unwound through the top-level marker
    assert_eq!(co.frame_depth(), 0);
}

#[test]
fn resume_of_the_main_thread_is_rejected() {
    let vm = vm();
    let main = vm.main_thread();
    let err = main.resume(&vm, &[]).unwrap_err();
    assert!(matches!(
        err.fault(),
        Some(Fault::CoroutineState(
            mink_vm::CoroutineFault::ResumeRunning
        ))
    ));
}

#[test]
fn close_cancels_a_suspended_body() {
    let vm = vm();
    let body = Closure::from_native(yield_once_then_return_nine, None, Value::Nil);
    let co = spawn(&vm, &body);

    co.resume(&vm, &[]).expect("reach the yield");
    assert_eq!(co.state(), FiberState::Suspended);

    co.close().expect("close");
    assert_eq!(co.state(), FiberState::Dead);
    assert!(co.has_error());
    assert_eq!(
        co.thrown_error().map(|v| v.to_string()),
        Some("coroutine closed while suspended".into())
    );
}

#[test]
fn shutdown_closes_all_pinned_coroutines() {
    let vm = vm();
    let body = Closure::from_native(yield_once_then_return_nine, None, Value::Nil);
    let first = spawn(&vm, &body);
    let second = spawn(&vm, &body);

    first.resume(&vm, &[]).expect("suspend first");

    vm.shutdown();
    assert_eq!(first.state(), FiberState::Dead);
    assert_eq!(second.state(), FiberState::Dead);
}

#[test]
fn walk_frames_sees_native_debug_info() {
    let vm = vm();
    fn describe(vm: &Vm, data: Option<&NativeData>) -> VmResult<usize> {
        let log = log_of(data);
        vm.set_debug_info(mink_vm::NativeDebugInfo {
            source: Some("host.rs".into()),
            func_name: Some("describe".into()),
            line: Some(42),
        });
        let co = vm.current_coroutine().expect("current");
        co.walk_frames(true, |view| {
            log.lock().expect("log").push(format!(
                "{}:{} native={} main={}",
                view.source.clone().unwrap_or_default(),
                view.line.map(|l| l.to_string()).unwrap_or_default(),
                view.is_native,
                view.is_main,
            ));
            true
        });
        Ok(0)
    }

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let body = Closure::from_native(describe, Some(NativeData::new(log.clone())), Value::Nil);
    let co = spawn(&vm, &body);
    co.resume(&vm, &[]).expect("resume");

    assert_eq!(
        log.lock().expect("log").clone(),
        vec!["[native host.rs]:42 native=true main=true".to_string()]
    );
}

#[test]
fn long_to_double_constant_round_trip_through_resume() {
    let vm = vm();
    let program = image(
        vec![ConstantImage::Long(1), ConstantImage::Double(2.5)],
        vec![
            op::get_constant(0, 0),
            op::get_constant(1, 1),
            op::add(2, 0, 1),
            op::ret(2, 1),
        ],
    );
    let co = spawn(&vm, &closure(&vm, &program));
    let result = co.resume(&vm, &[]).expect("resume");
    assert_eq!(result.values, vec![Value::Double(3.5)]);
}
