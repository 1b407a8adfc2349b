//! Declared types of call receivers in [CIL](https://ecma-international.org/publications-and-standards/standards/ecma-335/)
//! method bodies, found by walking the evaluation stack backwards.

#[macro_use]
extern crate bitflags;

pub mod analysis;
pub mod code_attribute;
pub mod error;
pub mod limits;
pub mod metadata;

pub use analysis::{
    declared_type_of_this_object, get_declared_type, get_declared_type_with, GenericBindings, GenericContext,
    NoGenericContext, ResolveOptions,
};
pub use error::{Error, Result};
pub use metadata::*;

#[cfg(feature = "decode")]
use code_attribute::TokenResolver;

/// Decode a raw code array into a method body.
///
/// ```rust
/// use declared_type_resolver::code_attribute::{OpCode, TokenTable};
///
/// // ldc.i4.s 7; pop; ret
/// let body = declared_type_resolver::parse_method_body(&[0x1f, 0x07, 0x26, 0x2a], &TokenTable::default(), vec![])
///     .expect("valid body");
/// assert_eq!(body.instructions().len(), 3);
/// assert_eq!(body.instructions()[1].opcode, OpCode::Pop);
/// assert_eq!(body.instructions()[2].offset, 3);
///
/// let truncated = declared_type_resolver::parse_method_body(&[0x20, 0x01], &TokenTable::default(), vec![]);
/// assert!(truncated.is_err());
/// ```
#[cfg(feature = "decode")]
pub fn parse_method_body(code: &[u8], tokens: &impl TokenResolver, variables: Vec<VariableDef>) -> Result<MethodBody> {
    let instructions = code_attribute::code_parser(code, tokens)?;
    MethodBody::new(instructions, variables)
}
