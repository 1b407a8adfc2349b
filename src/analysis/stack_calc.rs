use crate::code_attribute::{Instruction, OpCode, Operand, StackPop, StackPush};

/// Number of values `instr` leaves on the evaluation stack.
pub fn produced_to_stack_by(instr: &Instruction) -> usize {
    match instr.opcode.push_behaviour() {
        StackPush::Push0 => 0,
        StackPush::Push1 => 1,
        StackPush::Push1Push1 => 2,
        StackPush::VarPush => {
            if is_non_void_method_call(instr) {
                1
            } else {
                0
            }
        }
    }
}

/// Number of values `instr` takes off the evaluation stack.
pub fn consumed_from_stack_by(instr: &Instruction) -> usize {
    match instr.opcode.pop_behaviour() {
        StackPop::Pop0 => 0,
        StackPop::Pop1 => 1,
        StackPop::Pop2 => 2,
        StackPop::Pop3 => 3,
        StackPop::VarPop => match &instr.operand {
            // newobj creates its receiver, it never pops one
            Operand::Method(method) => usize::from(has_this_object(instr)) + method.parameters.len(),
            // ret: the body's own return value is never part of an expression walk
            _ => 0,
        },
    }
}

/// True for a `call`/`callvirt` whose callee takes an implicit receiver.
pub fn has_this_object(instr: &Instruction) -> bool {
    matches!(instr.opcode, OpCode::Call | OpCode::Callvirt)
        && matches!(&instr.operand, Operand::Method(method) if method.has_this)
}

fn is_non_void_method_call(instr: &Instruction) -> bool {
    matches!(instr.opcode, OpCode::Call | OpCode::Callvirt)
        && matches!(&instr.operand, Operand::Method(method) if !method.return_type.is_void())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MethodRef, TypeRef};

    fn method(has_this: bool, params: usize, return_type: TypeRef) -> MethodRef {
        MethodRef {
            name: "M".into(),
            declaring_type: TypeRef::named("Ns", "C"),
            return_type,
            parameters: vec![TypeRef::named("System", "Object"); params],
            has_this,
            generic_args: vec![],
        }
    }

    #[test]
    fn test_fixed_counts() {
        assert_eq!(produced_to_stack_by(&Instruction::new(OpCode::Ldloc0)), 1);
        assert_eq!(consumed_from_stack_by(&Instruction::new(OpCode::Ldloc0)), 0);
        assert_eq!(produced_to_stack_by(&Instruction::new(OpCode::Stloc0)), 0);
        assert_eq!(consumed_from_stack_by(&Instruction::new(OpCode::Stloc0)), 1);
        assert_eq!(consumed_from_stack_by(&Instruction::new(OpCode::LdelemRef)), 2);
        assert_eq!(consumed_from_stack_by(&Instruction::new(OpCode::StelemRef)), 3);
        assert_eq!(produced_to_stack_by(&Instruction::new(OpCode::BrtrueS)), 0);
    }

    #[test]
    fn test_dup_pushes_two() {
        let dup = Instruction::new(OpCode::Dup);
        assert_eq!(produced_to_stack_by(&dup), 2);
        assert_eq!(consumed_from_stack_by(&dup), 1);
    }

    #[test]
    fn test_calls() {
        let void_instance = Instruction::with_operand(OpCode::Callvirt, Operand::Method(method(true, 2, TypeRef::void())));
        assert_eq!(produced_to_stack_by(&void_instance), 0);
        assert_eq!(consumed_from_stack_by(&void_instance), 3);
        assert!(has_this_object(&void_instance));

        let static_func = Instruction::with_operand(
            OpCode::Call,
            Operand::Method(method(false, 1, TypeRef::named("System", "Int32"))),
        );
        assert_eq!(produced_to_stack_by(&static_func), 1);
        assert_eq!(consumed_from_stack_by(&static_func), 1);
        assert!(!has_this_object(&static_func));
    }

    #[test]
    fn test_newobj_pops_only_arguments() {
        let ctor = Instruction::with_operand(OpCode::Newobj, Operand::Method(method(true, 1, TypeRef::void())));
        assert_eq!(produced_to_stack_by(&ctor), 1);
        assert_eq!(consumed_from_stack_by(&ctor), 1);
        assert!(!has_this_object(&ctor));
    }

    #[test]
    fn test_ret_without_operand() {
        let ret = Instruction::new(OpCode::Ret);
        assert_eq!(produced_to_stack_by(&ret), 0);
        assert_eq!(consumed_from_stack_by(&ret), 0);
    }
}
