//! The tagged value model: coercions, equality, ordering, hashing,
//! arithmetic, and formatting.

use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::OnceLock;

use crate::closure::Closure;
use crate::coroutine::Coroutine;
use crate::error::Fault;
use crate::heap::ObjectRef;
use crate::strings::VmString;
use crate::table::TableRef;
use crate::userdata::{GcObject, LightUserdata, UserdataRef};

/// Integer representation of the guest language.
pub type Integer = i64;

/// Floating-point representation of the guest language.
pub type Number = f64;

/// 2^63 as a double; doubles in `[-2^63, 2^63)` convert to `Integer`
/// losslessly when integral.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// A guest value.
///
/// Heap-referencing variants hold shared handles; cloning a value never
/// copies heap storage.
#[derive(Clone, Default)]
pub enum Value {
    /// The absence of a useful value.
    #[default]
    Nil,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Long(Integer),
    /// 64-bit IEEE double.
    Double(Number),
    /// Immutable byte string.
    String(VmString),
    /// Mutable associative table.
    Table(TableRef),
    /// Callable binding.
    Closure(Closure),
    /// Cooperative task.
    Coroutine(Coroutine),
    /// Engine-owned opaque buffer.
    FullUserdata(UserdataRef),
    /// Unmanaged host pointer.
    LightUserdata(LightUserdata),
    /// Collector-managed host object.
    GcUserdata(GcObject),
}

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Mod,
    /// Exponentiation.
    Pow,
}

impl ArithOp {
    /// Operator symbol used in diagnostics.
    pub const fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
            ArithOp::Pow => "^",
        }
    }
}

/// Hash arbitrary bytes with the engine's fixed-seed 64-bit hasher.
pub(crate) fn hash_bytes(bytes: &[u8]) -> u64 {
    static STATE: OnceLock<ahash::RandomState> = OnceLock::new();
    let state = STATE.get_or_init(|| {
        ahash::RandomState::with_seeds(
            0x243f_6a88_85a3_08d3,
            0x1319_8a2e_0370_7344,
            0xa409_3822_299f_31d0,
            0x082e_fa98_ec4e_6c89,
        )
    });
    let mut hasher = state.build_hasher();
    hasher.write(bytes);
    hasher.finish()
}

fn long_eq_double(long: Integer, double: Number) -> bool {
    double.is_finite()
        && double.fract() == 0.0
        && double >= -TWO_POW_63
        && double < TWO_POW_63
        && double as Integer == long
}

fn double_eq(a: Number, b: Number) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

impl Value {
    /// Human-readable type name used in diagnostics.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Closure(_) => "function",
            Value::Coroutine(_) => "coroutine",
            Value::FullUserdata(_) | Value::LightUserdata(_) | Value::GcUserdata(_) => "userdata",
        }
    }

    /// Whether this is `Nil`.
    pub const fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Whether this is `Long` or `Double`.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    /// Whether the value can be invoked.
    pub const fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_))
    }

    /// Whether the value can be indexed.
    pub const fn is_indexable(&self) -> bool {
        matches!(self, Value::Table(_))
    }

    /// Length of a string (bytes) or table (live entries).
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::Table(t) => Some(t.len()),
            _ => None,
        }
    }

    /// Numeric coercion. Accepts `Long`, `Double`, and strings whose full
    /// content (after leading whitespace) parses as a decimal number.
    pub fn to_double(&self) -> Option<Number> {
        match self {
            Value::Long(n) => Some(*n as Number),
            Value::Double(d) => Some(*d),
            Value::String(s) => {
                let text = std::str::from_utf8(s.as_bytes()).ok()?;
                let trimmed = text.trim_start();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse().ok()
            }
            _ => None,
        }
    }

    /// Numeric ordering; `None` when the pair cannot be ordered.
    pub fn partial_lt(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Long(a), Value::Long(b)) => Some(a < b),
            (Value::Double(a), Value::Double(b)) => Some(a < b),
            (Value::Long(a), Value::Double(b)) => Some((*a as Number) < *b),
            (Value::Double(a), Value::Long(b)) => Some(*a < (*b as Number)),
            _ => None,
        }
    }

    /// The 64-bit value hash. Equal values hash equal; in particular an
    /// integral double hashes like the corresponding long.
    pub fn hash64(&self) -> u64 {
        match self {
            Value::Nil => 0,
            Value::Bool(b) => hash_bytes(&[*b as u8]),
            Value::Long(n) => hash_bytes(&n.to_le_bytes()),
            Value::Double(d) => {
                if long_eq_double(*d as Integer, *d) {
                    hash_bytes(&(*d as Integer).to_le_bytes())
                } else {
                    let bits = if d.is_nan() {
                        Number::NAN.to_bits()
                    } else {
                        d.to_bits()
                    };
                    hash_bytes(&bits.to_le_bytes())
                }
            }
            Value::String(s) => s.hash64(),
            _ => hash_bytes(&self.identity().unwrap_or(0).to_le_bytes()),
        }
    }

    /// Identity token of a reference variant; scalars have none.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.addr()),
            Value::Table(t) => Some(t.addr()),
            Value::Closure(c) => Some(c.addr()),
            Value::Coroutine(c) => Some(c.addr()),
            Value::FullUserdata(u) => Some(u.addr()),
            Value::LightUserdata(u) => Some(u.addr()),
            Value::GcUserdata(o) => Some(o.addr()),
            _ => None,
        }
    }

    /// The heap object behind the value, for collector mirror slots.
    pub fn object_ref(&self) -> Option<ObjectRef> {
        match self {
            Value::String(s) => Some(ObjectRef::String(s.clone())),
            Value::Table(t) => Some(ObjectRef::Table(t.clone())),
            Value::Closure(c) => Some(ObjectRef::Closure(c.clone())),
            Value::Coroutine(c) => Some(ObjectRef::Coroutine(c.clone())),
            Value::FullUserdata(u) => Some(ObjectRef::Userdata(u.clone())),
            Value::GcUserdata(o) => Some(ObjectRef::GcUserdata(o.clone())),
            _ => None,
        }
    }
}

/// Binary arithmetic per the coercion rules: `Long ⊕ Long` stays `Long`
/// under two's-complement wrapping, any `Double` operand promotes both, and
/// exponentiation always produces a `Double`.
pub(crate) fn arith(op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value, Fault> {
    if !lhs.is_numeric() || !rhs.is_numeric() {
        return Err(Fault::Arithmetic {
            op: op.symbol(),
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        });
    }

    if let (Value::Long(a), Value::Long(b)) = (lhs, rhs) {
        if op != ArithOp::Pow {
            return long_arith(op, *a, *b);
        }
    }

    // `is_numeric` held, so the coercions cannot fail
    let a = lhs.to_double().unwrap_or_default();
    let b = rhs.to_double().unwrap_or_default();
    Ok(Value::Double(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => a % b,
        ArithOp::Pow => a.powf(b),
    }))
}

fn long_arith(op: ArithOp, a: Integer, b: Integer) -> Result<Value, Fault> {
    Ok(Value::Long(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div => {
            if b == 0 {
                return Err(Fault::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        ArithOp::Mod => {
            if b == 0 {
                return Err(Fault::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        ArithOp::Pow => unreachable!("exponentiation always promotes"),
    }))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => double_eq(*a, *b),
            (Value::Long(l), Value::Double(d)) | (Value::Double(d), Value::Long(l)) => {
                long_eq_double(*l, *d)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Closure(a), Value::Closure(b)) => a.ptr_eq(b),
            (Value::Coroutine(a), Value::Coroutine(b)) => a.ptr_eq(b),
            (Value::FullUserdata(a), Value::FullUserdata(b)) => a.ptr_eq(b),
            (Value::LightUserdata(a), Value::LightUserdata(b)) => a.addr() == b.addr(),
            (Value::GcUserdata(a), Value::GcUserdata(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash64());
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Integer> for Value {
    fn from(n: Integer) -> Self {
        Value::Long(n)
    }
}

impl From<Number> for Value {
    fn from(d: Number) -> Self {
        Value::Double(d)
    }
}

impl From<VmString> for Value {
    fn from(s: VmString) -> Self {
        Value::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(true) => f.write_str("true"),
            Value::Bool(false) => f.write_str("false"),
            Value::Long(n) => write!(f, "{n}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => f.write_str(&s.to_str_lossy()),
            Value::Table(t) => write!(f, "table 0x{:x}", t.addr()),
            Value::Closure(c) => write!(f, "function 0x{:x}", c.addr()),
            Value::Coroutine(c) => write!(f, "coroutine 0x{:x}", c.addr()),
            Value::FullUserdata(u) => write!(f, "userdata 0x{:x}", u.addr()),
            Value::LightUserdata(u) => write!(f, "userdata 0x{:x}", u.addr()),
            Value::GcUserdata(o) => write!(f, "userdata 0x{:x}", o.addr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Long(n) => write!(f, "Long({n})"),
            Value::Double(d) => write!(f, "Double({d})"),
            Value::String(s) => write!(f, "String({:?})", s.to_str_lossy()),
            Value::Table(t) => write!(f, "Table(0x{:x})", t.addr()),
            Value::Closure(c) => write!(f, "Closure(0x{:x})", c.addr()),
            Value::Coroutine(c) => write!(f, "Coroutine(0x{:x})", c.addr()),
            Value::FullUserdata(u) => write!(f, "FullUserdata(0x{:x})", u.addr()),
            Value::LightUserdata(u) => write!(f, "LightUserdata(0x{:x})", u.addr()),
            Value::GcUserdata(o) => write!(f, "GcUserdata(0x{:x})", o.addr()),
        }
    }
}
