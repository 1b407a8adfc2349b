use tracing::debug;

use crate::code_attribute::{OpCode, Operand};
use crate::error::{Error, Result};
use crate::limits::MAX_EXPRESSION_NESTING_DEPTH;
use crate::metadata::{MethodDef, TypeRef};

use super::generics::{resolve_generic_return_type, resolve_generic_type, GenericContext};
use super::locator::Locator;
use super::normalize::normalize;
use super::stack_calc::consumed_from_stack_by;

/// Knobs for a declared-type query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveOptions {
    /// How deep nested sub-expressions may be unwound before giving up.
    pub max_nesting_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            max_nesting_depth: MAX_EXPRESSION_NESTING_DEPTH,
        }
    }
}

/// Declared type of the deepest operand consumed by the instruction at
/// `index` in `method`'s body, i.e. the receiver of a call or field access.
///
/// Returns `Ok(None)` when that operand is not produced by anything with a
/// declared type (a constant, arithmetic, a token handle).
pub fn get_declared_type(method: &MethodDef, index: usize, context: &impl GenericContext) -> Result<Option<TypeRef>> {
    get_declared_type_with(method, index, context, &ResolveOptions::default())
}

/// [`get_declared_type`] under the name used for call receivers.
pub fn declared_type_of_this_object(
    method: &MethodDef,
    index: usize,
    context: &impl GenericContext,
) -> Result<Option<TypeRef>> {
    get_declared_type(method, index, context)
}

pub fn get_declared_type_with(
    method: &MethodDef,
    index: usize,
    context: &impl GenericContext,
    options: &ResolveOptions,
) -> Result<Option<TypeRef>> {
    let instructions = method.body.instructions();
    let consumer = instructions.get(index).ok_or(Error::InstructionOutOfRange {
        index,
        len: instructions.len(),
    })?;

    let locator = Locator::new(instructions, options.max_nesting_depth);
    let mut producer = locator.locate(index, true, consumed_from_stack_by(consumer))?;
    while instructions[producer].opcode == OpCode::Dup {
        producer = locator.locate(producer, true, consumed_from_stack_by(&instructions[producer]))?;
    }

    let instr = &instructions[producer];
    let enclosing = &method.declaring_type;
    let declared = match &instr.operand {
        // A token handle, not a value of the named member's type
        _ if instr.opcode == OpCode::Ldtoken => None,
        Operand::Variable(index) => {
            let variable = method.body.variable(*index).ok_or_else(|| Error::InvalidBody {
                reason: format!("{} reads undeclared local {}", instr, index),
            })?;
            Some(resolve_generic_type(normalize(&variable.variable_type), Some(enclosing), context)?)
        }
        // The implicit receiver is the declaring type itself, never substituted
        Operand::Parameter(0) if !method.is_static() => Some(enclosing.clone()),
        Operand::Parameter(slot) => {
            let parameter = method.parameter_for_slot(*slot).ok_or_else(|| Error::InvalidBody {
                reason: format!("{} reads undeclared argument {}", instr, slot),
            })?;
            Some(resolve_generic_type(normalize(&parameter.parameter_type), Some(enclosing), context)?)
        }
        Operand::Field(field) => Some(resolve_generic_type(
            normalize(&field.field_type),
            Some(&field.declaring_type),
            context,
        )?),
        Operand::Method(callee) => Some(resolve_generic_return_type(callee, context)?),
        Operand::Type(ty) => Some(resolve_generic_type(ty, Some(enclosing), context)?),
        Operand::None
        | Operand::Int(_)
        | Operand::Float(_)
        | Operand::String(_)
        | Operand::Branch(_)
        | Operand::Switch(_) => None,
    };

    match &declared {
        Some(ty) => debug!(producer = %instr, declared = %ty, "resolved declared type"),
        None => debug!(producer = %instr, "producer has no declared type"),
    }
    Ok(declared)
}
