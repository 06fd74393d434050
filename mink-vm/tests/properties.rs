//! Value-model laws, checked over generated inputs.

use quickcheck::{Arbitrary, Gen, TestResult};
use quickcheck_macros::quickcheck;

use mink_vm::{ArithOp, Value, VmString};

mod common;

use common::vm;

/// Values drawn from a deliberately small pool so equality collisions
/// (including cross-variant `Long`/`Double` ones) actually occur.
#[derive(Debug, Clone)]
struct SmallValue(Value);

impl Arbitrary for SmallValue {
    fn arbitrary(g: &mut Gen) -> Self {
        let longs = [-2i64, -1, 0, 1, 2];
        let doubles = [-1.0f64, -0.0, 0.0, 1.0, 1.5, 2.0, f64::NAN];
        let strings: [&[u8]; 4] = [b"", b"a", b"key", b"1"];
        let value = match u8::arbitrary(g) % 5 {
            0 => Value::Nil,
            1 => Value::Bool(bool::arbitrary(g)),
            2 => Value::Long(*g.choose(&longs).unwrap_or(&0)),
            3 => Value::Double(*g.choose(&doubles).unwrap_or(&0.0)),
            _ => {
                let bytes = g.choose(&strings).copied().unwrap_or(b"");
                Value::String(VmString::new(bytes).expect("alloc"))
            }
        };
        SmallValue(value)
    }
}

#[quickcheck]
fn equal_values_hash_equal(a: SmallValue, b: SmallValue) -> bool {
    a.0 != b.0 || a.0.hash64() == b.0.hash64()
}

#[quickcheck]
fn equality_is_reflexive(a: SmallValue) -> bool {
    a.0 == a.0
}

#[quickcheck]
fn equality_is_symmetric(a: SmallValue, b: SmallValue) -> bool {
    (a.0 == b.0) == (b.0 == a.0)
}

#[quickcheck]
fn equality_is_transitive(a: SmallValue, b: SmallValue, c: SmallValue) -> TestResult {
    if a.0 == b.0 && b.0 == c.0 {
        TestResult::from_bool(a.0 == c.0)
    } else {
        TestResult::discard()
    }
}

#[quickcheck]
fn long_display_round_trips_through_coercion(n: i64) -> bool {
    let shown = Value::Long(n).to_string();
    let reparsed = Value::String(VmString::new(shown.as_bytes()).expect("alloc")).to_double();
    reparsed == Some(n as f64)
}

#[quickcheck]
fn finite_double_display_round_trips(d: f64) -> TestResult {
    if !d.is_finite() {
        return TestResult::discard();
    }
    let shown = Value::Double(d).to_string();
    TestResult::from_bool(shown.parse::<f64>().ok() == Some(d))
}

#[quickcheck]
fn push_pop_round_trip(value: SmallValue) -> bool {
    let vm = vm();
    let stack = vm.stack();
    stack.push(value.0.clone()).expect("push");
    let observed = stack.value_at(-1).expect("peek");
    stack.pop(1).expect("pop");
    observed == value.0 && stack.top() == 0
}

#[quickcheck]
fn long_addition_wraps(a: i64, b: i64) -> bool {
    arith_longs(ArithOp::Add, a, b) == Some(Value::Long(a.wrapping_add(b)))
}

#[quickcheck]
fn long_multiplication_wraps(a: i64, b: i64) -> bool {
    arith_longs(ArithOp::Mul, a, b) == Some(Value::Long(a.wrapping_mul(b)))
}

#[quickcheck]
fn mixed_operands_promote_to_double(a: i64, b: f64) -> TestResult {
    if !b.is_finite() {
        return TestResult::discard();
    }
    let result = run_arith(ArithOp::Add, Value::Long(a), Value::Double(b));
    TestResult::from_bool(matches!(result, Some(Value::Double(_))))
}

fn arith_longs(op: ArithOp, a: i64, b: i64) -> Option<Value> {
    run_arith(op, Value::Long(a), Value::Long(b))
}

fn run_arith(op: ArithOp, lhs: Value, rhs: Value) -> Option<Value> {
    let vm = vm();
    let program = common::image(
        vec![],
        vec![
            mink_asm::op::stack_pop(1),
            mink_asm::op::stack_pop(0),
            arith_word(op),
            mink_asm::op::ret(2, 1),
        ],
    );
    let entry = common::closure(&vm, &program);
    common::resume_once(&vm, &entry, &[lhs, rhs])
        .ok()
        .and_then(|result| result.values.into_iter().next())
}

fn arith_word(op: ArithOp) -> u64 {
    match op {
        ArithOp::Add => mink_asm::op::add(2, 0, 1),
        ArithOp::Sub => mink_asm::op::sub(2, 0, 1),
        ArithOp::Mul => mink_asm::op::mul(2, 0, 1),
        ArithOp::Div => mink_asm::op::div(2, 0, 1),
        ArithOp::Mod => mink_asm::op::modulo(2, 0, 1),
        ArithOp::Pow => mink_asm::op::pow(2, 0, 1),
    }
}
