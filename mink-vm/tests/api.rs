//! Host stack API semantics.

use mink_vm::api::{is_pseudo_index, Status, ValueType, REGISTRY_INDEX};
use mink_vm::{Closure, NativeData, Value, Vm, VmError, VmResult};

mod common;

use common::vm;

#[test]
fn absolute_and_relative_indices_agree() {
    let vm = vm();
    let stack = vm.stack();
    stack.push_long(10).expect("push");
    stack.push_long(20).expect("push");
    stack.push_long(30).expect("push");

    assert_eq!(stack.top(), 3);
    assert_eq!(stack.abs_index(-1).expect("abs"), 3);
    assert_eq!(stack.abs_index(-3).expect("abs"), 1);
    assert_eq!(stack.abs_index(2).expect("abs"), 2);
    assert!(stack.abs_index(0).is_err());
    assert!(stack.abs_index(4).is_err());
    assert!(stack.abs_index(-4).is_err());

    assert_eq!(stack.value_at(-2).expect("value"), Value::Long(20));
    assert_eq!(stack.value_at(1).expect("value"), Value::Long(10));
    stack.pop(3).expect("pop");
}

#[test]
fn pseudo_index_reaches_the_registry() {
    let vm = vm();
    assert!(is_pseudo_index(REGISTRY_INDEX));
    assert!(!is_pseudo_index(-1));
    assert!(!is_pseudo_index(1));

    let stack = vm.stack();
    let registry = stack.value_at(REGISTRY_INDEX).expect("registry");
    assert!(matches!(registry, Value::Table(_)));
    // pseudo-indices survive abs_index untouched
    assert_eq!(stack.abs_index(REGISTRY_INDEX).expect("abs"), REGISTRY_INDEX);
}

#[test]
fn type_tests_follow_the_value_model() {
    let vm = vm();
    let stack = vm.stack();
    stack.push_nil().expect("push");
    stack.push_bool(true).expect("push");
    stack.push_long(3).expect("push");
    stack.push_double(0.5).expect("push");
    stack.push_str("4.5").expect("push");
    stack.new_table().expect("push");

    assert!(stack.is_nil(1));
    assert!(stack.is_bool(2));
    assert!(stack.is_long(3));
    assert!(!stack.is_long(4));
    assert!(stack.is_number(3));
    assert!(stack.is_number(4));
    // numeric strings coerce
    assert!(stack.is_number(5));
    assert!(stack.is_string(5));
    assert!(stack.is_string(3));
    assert!(stack.is_table(6));
    assert!(stack.is_none(7));
    assert_eq!(stack.type_of(6), Some(ValueType::Table));
    assert_eq!(stack.type_of(7), None);
    assert_eq!(ValueType::Table.name(), "table");

    stack.pop(6).expect("pop");
}

#[test]
fn to_string_coerces_numbers_in_place() {
    let vm = vm();
    let stack = vm.stack();
    stack.push_long(42).expect("push");

    let coerced = stack.to_string(-1).expect("coerce");
    assert_eq!(coerced.as_bytes(), b"42");
    // the slot now holds the string form
    assert!(matches!(stack.value_at(-1).expect("value"), Value::String(_)));

    stack.push_nil().expect("push");
    assert!(stack.to_string(-1).is_err());
    stack.pop(2).expect("pop");
}

#[test]
fn numeric_coercions_read_strings() {
    let vm = vm();
    let stack = vm.stack();
    stack.push_str("  2.5").expect("push");
    stack.push_str("2.5x").expect("push");

    assert_eq!(stack.to_double(1), Some(2.5));
    assert_eq!(stack.to_double(2), None);
    assert_eq!(stack.to_long(1), Some(2));
    stack.pop(2).expect("pop");
}

#[test]
fn copy_remove_replace_reshape_the_stack() {
    let vm = vm();
    let stack = vm.stack();
    for n in 1..=4 {
        stack.push_long(n).expect("push");
    }

    stack.copy(1, 4).expect("copy"); // [1, 2, 3, 1]
    assert_eq!(stack.value_at(4).expect("value"), Value::Long(1));

    stack.remove(2).expect("remove"); // [1, 3, 1]
    assert_eq!(stack.top(), 3);
    assert_eq!(stack.value_at(2).expect("value"), Value::Long(3));

    stack.push_long(9).expect("push"); // [1, 3, 1, 9]
    stack.replace(1).expect("replace"); // [9, 3, 1]
    assert_eq!(stack.top(), 3);
    assert_eq!(stack.value_at(1).expect("value"), Value::Long(9));
    stack.pop(3).expect("pop");
}

#[test]
fn len_pushes_string_and_table_lengths() {
    let vm = vm();
    let stack = vm.stack();
    stack.push_bytes(b"he\0llo").expect("push");
    stack.len(-1).expect("len");
    assert_eq!(stack.value_at(-1).expect("value"), Value::Long(6));
    stack.pop(2).expect("pop");

    let table = vm.new_table().expect("table");
    if let Value::Table(t) = &table {
        t.set(Value::Long(1), Value::Long(10)).expect("set");
        t.set(Value::Long(2), Value::Long(20)).expect("set");
    }
    stack.push(table).expect("push");
    stack.len(-1).expect("len");
    assert_eq!(stack.value_at(-1).expect("value"), Value::Long(2));
    stack.pop(2).expect("pop");

    stack.push_nil().expect("push");
    assert!(stack.len(-1).is_err());
    stack.pop(1).expect("pop");
}

fn double_top(vm: &Vm, _data: Option<&NativeData>) -> VmResult<usize> {
    let co = vm.current_coroutine().expect("current");
    let stack = vm.stack_of(&co);
    let value = stack.to_double(-1).unwrap_or(0.0);
    stack.push_double(value * 2.0)?;
    Ok(1)
}

#[test]
fn call_consumes_function_and_arguments() {
    let vm = vm();
    let stack = vm.stack();
    let doubler = Closure::from_native(double_top, None, Value::Nil);

    stack.push(doubler.as_value()).expect("push fn");
    stack.push_double(21.0).expect("push arg");
    stack.call(1, 1).expect("call");

    assert_eq!(stack.top(), 1);
    assert_eq!(stack.value_at(-1).expect("result"), Value::Double(42.0));
    stack.pop(1).expect("pop");
}

fn fail_loudly(vm: &Vm, _data: Option<&NativeData>) -> VmResult<usize> {
    Err(VmError::Raised(vm.new_string(b"kaboom")?))
}

#[test]
fn pcall_reports_status_and_leaves_the_error_value() {
    let vm = vm();
    let stack = vm.stack();
    let failing = Closure::from_native(fail_loudly, None, Value::Nil);

    stack.push_long(1).expect("sentinel");
    stack.push(failing.as_value()).expect("push fn");
    stack.push_long(2).expect("push arg");

    let status = stack.pcall(1, 0);
    assert_eq!(status, Status::RuntimeError);
    assert_eq!(status.code(), 2);

    // function and argument replaced by the error value; the sentinel stays
    assert_eq!(stack.top(), 2);
    assert_eq!(
        stack.value_at(-1).expect("error value").to_string(),
        "kaboom"
    );
    assert_eq!(stack.value_at(1).expect("sentinel"), Value::Long(1));
    assert_eq!(vm.last_error().map(|v| v.to_string()), Some("kaboom".into()));
    stack.pop(2).expect("pop");
}

#[test]
fn pcall_success_is_ok() {
    let vm = vm();
    let stack = vm.stack();
    let doubler = Closure::from_native(double_top, None, Value::Nil);
    stack.push(doubler.as_value()).expect("push fn");
    stack.push_double(1.0).expect("push arg");
    assert_eq!(stack.pcall(1, 1), Status::Ok);
    assert_eq!(stack.value_at(-1).expect("result"), Value::Double(2.0));
    stack.pop(1).expect("pop");
}

#[test]
fn raise_takes_the_error_value_from_the_top() {
    let vm = vm();
    let stack = vm.stack();
    stack.push_str("user error").expect("push");
    let err = stack.raise();
    assert_eq!(err.to_string(), "user error");
    assert_eq!(stack.top(), 0);
}

#[test]
fn capacity_check_accounts_for_used_slots() {
    let vm = vm();
    let stack = vm.stack();
    assert!(stack.check_capacity(mink_vm::consts::VM_STACK_SIZE));
    stack.push_long(1).expect("push");
    assert!(!stack.check_capacity(mink_vm::consts::VM_STACK_SIZE));
    assert!(stack.check_capacity(mink_vm::consts::VM_STACK_SIZE - 1));
    stack.pop(1).expect("pop");
}

#[test]
fn is_yieldable_is_false_on_the_main_thread() {
    let vm = vm();
    assert!(!vm.stack().is_yieldable());
}
