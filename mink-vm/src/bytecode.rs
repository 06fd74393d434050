//! Bytecode program model and its wire form.
//!
//! A program is a constant pool (scalars and strings only), a prototype tree
//! referenced by `LOAD_PROTOTYPE`, per-prototype instruction vectors with an
//! optional line map, and the source-file name. The wire form
//! ([`ProgramImage`]) is plain data; [`ProgramImage::instantiate`] validates
//! it against a VM and interns its strings.

use std::sync::Arc;

use mink_asm::RawInstruction;

use crate::error::VmResult;
use crate::strings::VmString;
use crate::value::Value;
use crate::vm::Vm;

/// Constant-pool entry in wire form.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ConstantImage {
    /// Nil.
    Nil,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Long(i64),
    /// 64-bit double.
    Double(f64),
    /// Byte string.
    String(Vec<u8>),
}

/// Prototype in wire form.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PrototypeImage {
    /// Instruction words.
    pub instructions: Vec<RawInstruction>,
    /// Child prototypes addressed by `LOAD_PROTOTYPE`.
    pub prototypes: Vec<PrototypeImage>,
    /// Optional source line per instruction word.
    pub line_info: Option<Vec<u32>>,
}

/// A complete program in wire form.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProgramImage {
    /// Shared constant pool.
    pub constants: Vec<ConstantImage>,
    /// Root prototype.
    pub root: PrototypeImage,
    /// Source-file name for diagnostics.
    pub source: String,
}

/// Deserialization failure.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The byte stream is not a valid program image.
    #[error("malformed program image: {0}")]
    Codec(#[from] bincode::Error),
}

impl ProgramImage {
    /// Decode an image from its serialized form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Serialize the image.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LoadError> {
        Ok(bincode::serialize(self)?)
    }

    /// Build the runtime program: intern constant strings against `vm` and
    /// share the constant pool across the prototype tree.
    pub fn instantiate(&self, vm: &Vm) -> VmResult<Program> {
        let mut constants = Vec::with_capacity(self.constants.len());
        for constant in &self.constants {
            constants.push(match constant {
                ConstantImage::Nil => Value::Nil,
                ConstantImage::Bool(b) => Value::Bool(*b),
                ConstantImage::Long(n) => Value::Long(*n),
                ConstantImage::Double(d) => Value::Double(*d),
                ConstantImage::String(bytes) => vm.intern(bytes)?,
            });
        }
        let constants: Arc<[Value]> = constants.into();
        let source = vm.intern_string(self.source.as_bytes())?;
        let root = Arc::new(Prototype::instantiate(&self.root, &constants, &source));
        Ok(Program {
            constants,
            root,
            source,
        })
    }
}

/// The compiled body a non-native closure instantiates.
#[derive(Debug)]
pub struct Prototype {
    instructions: Box<[RawInstruction]>,
    prototypes: Vec<Arc<Prototype>>,
    line_info: Option<Box<[u32]>>,
    constants: Arc<[Value]>,
    source: VmString,
}

impl Prototype {
    fn instantiate(image: &PrototypeImage, constants: &Arc<[Value]>, source: &VmString) -> Self {
        Prototype {
            instructions: image.instructions.clone().into_boxed_slice(),
            prototypes: image
                .prototypes
                .iter()
                .map(|child| Arc::new(Prototype::instantiate(child, constants, source)))
                .collect(),
            line_info: image
                .line_info
                .as_ref()
                .map(|lines| lines.clone().into_boxed_slice()),
            constants: constants.clone(),
            source: source.clone(),
        }
    }

    /// The instruction vector.
    pub fn instructions(&self) -> &[RawInstruction] {
        &self.instructions
    }

    /// Child prototype by `LOAD_PROTOTYPE` index.
    pub fn child(&self, index: usize) -> Option<&Arc<Prototype>> {
        self.prototypes.get(index)
    }

    /// Constant-pool entry by index.
    pub fn constant(&self, index: usize) -> Option<&Value> {
        self.constants.get(index)
    }

    /// Source line of the instruction at `pc`, when the line map carries it.
    pub fn line_for(&self, pc: usize) -> Option<u32> {
        self.line_info.as_ref()?.get(pc).copied()
    }

    /// Source-file name.
    pub fn source(&self) -> &VmString {
        &self.source
    }
}

/// A fully instantiated program.
#[derive(Debug, Clone)]
pub struct Program {
    constants: Arc<[Value]>,
    root: Arc<Prototype>,
    source: VmString,
}

impl Program {
    /// The shared constant pool.
    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// The root prototype.
    pub fn root(&self) -> &Arc<Prototype> {
        &self.root
    }

    /// Source-file name.
    pub fn source(&self) -> &VmString {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mink_asm::op;

    fn sample_image() -> ProgramImage {
        ProgramImage {
            constants: vec![
                ConstantImage::Long(2),
                ConstantImage::String(b"greeting".to_vec()),
                ConstantImage::Double(0.5),
            ],
            root: PrototypeImage {
                instructions: vec![op::get_constant(0, 0), op::ret(0, 1)],
                prototypes: vec![PrototypeImage {
                    instructions: vec![op::ret(0, 0)],
                    prototypes: vec![],
                    line_info: None,
                }],
                line_info: Some(vec![1, 2]),
            },
            source: "sample.mk".into(),
        }
    }

    #[test]
    fn wire_round_trip() {
        let image = sample_image();
        let bytes = image.to_bytes().expect("serialize");
        let back = ProgramImage::from_bytes(&bytes).expect("deserialize");
        assert_eq!(image, back);
    }

    #[test]
    fn instantiation_shares_constants_and_interns_strings() {
        let vm = Vm::new().expect("vm");
        let program = sample_image().instantiate(&vm).expect("instantiate");

        assert_eq!(program.constants().len(), 3);
        assert_eq!(program.root().constant(0), Some(&Value::Long(2)));
        let child = program.root().child(0).expect("child");
        assert_eq!(child.constant(2), Some(&Value::Double(0.5)));
        assert_eq!(program.root().line_for(1), Some(2));
        assert_eq!(child.line_for(0), None);
        assert_eq!(program.source().as_bytes(), b"sample.mk");

        // the same literal interns to the same allocation
        let again = sample_image().instantiate(&vm).expect("instantiate");
        let (Some(Value::String(a)), Some(Value::String(b))) =
            (program.root().constant(1), again.root().constant(1))
        else {
            panic!("string constant expected");
        };
        assert!(a.ptr_eq(b));
    }
}
