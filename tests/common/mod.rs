#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;

use declared_type_resolver::code_attribute::{Instruction, OpCode, Operand};
use declared_type_resolver::{
    FieldRef, GenericContext, GenericParam, MethodAttributes, MethodBody, MethodDef, MethodRef, ParameterDef,
    TypeRef, VariableDef,
};

pub const FIXTURE: &str = "Tests.Fixture";
pub const GENERIC_CLASS: &str = "Tests.GenericClass`2";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---- Types ----

pub fn i_base() -> TypeRef {
    TypeRef::named("Tests", "IBase")
}

pub fn i_derived() -> TypeRef {
    TypeRef::named("Tests", "IDerived")
}

pub fn derived() -> TypeRef {
    TypeRef::named("Tests", "Derived")
}

pub fn fixture() -> TypeRef {
    TypeRef::named("Tests", "Fixture")
}

pub fn object() -> TypeRef {
    TypeRef::named("System", "Object")
}

pub fn int32() -> TypeRef {
    TypeRef::named("System", "Int32")
}

pub fn string() -> TypeRef {
    TypeRef::named("System", "String")
}

pub fn boolean() -> TypeRef {
    TypeRef::named("System", "Boolean")
}

pub fn tintf() -> GenericParam {
    GenericParam::of_type(GENERIC_CLASS, 0, "TIntf")
}

pub fn timpl() -> GenericParam {
    GenericParam::of_type(GENERIC_CLASS, 1, "TImpl")
}

/// `GenericClass<TIntf, TImpl>` as seen from inside its own definition.
pub fn generic_class_self() -> TypeRef {
    TypeRef::instance(
        "Tests",
        "GenericClass`2",
        vec![TypeRef::GenericParam(tintf()), TypeRef::GenericParam(timpl())],
    )
}

pub fn generic_class_definition() -> TypeRef {
    TypeRef::named("Tests", "GenericClass`2")
}

/// `GenericClass<IDerived, Derived>`
pub fn generic_class_closed() -> TypeRef {
    TypeRef::instance("Tests", "GenericClass`2", vec![i_derived(), derived()])
}

// ---- Members ----

pub fn method(declaring: TypeRef, name: &str, has_this: bool, params: Vec<TypeRef>, returns: TypeRef) -> MethodRef {
    MethodRef {
        name: name.into(),
        declaring_type: declaring,
        return_type: returns,
        parameters: params,
        has_this,
        generic_args: vec![],
    }
}

/// `IBase::Func0/1/2`, each returning `int` and taking `object` arguments.
pub fn func(arity: usize) -> MethodRef {
    method(i_base(), &format!("Func{}", arity), true, vec![object(); arity], int32())
}

pub fn action0() -> MethodRef {
    method(i_base(), "Action0", true, vec![], TypeRef::void())
}

pub fn action1() -> MethodRef {
    let nullable_int = TypeRef::instance("System", "Nullable`1", vec![int32()]);
    method(i_base(), "Action1", true, vec![nullable_int], TypeRef::void())
}

/// `static IDerived GetObject()`
pub fn get_object() -> MethodRef {
    method(fixture(), "GetObject", false, vec![], i_derived())
}

/// `IDerived GetObject2(int)`
pub fn get_object2_with_arg() -> MethodRef {
    method(fixture(), "GetObject2", true, vec![int32()], i_derived())
}

/// `static T Identity<T>(T)` instantiated with `arg`
pub fn identity(arg: TypeRef) -> MethodRef {
    let t = TypeRef::GenericParam(GenericParam::of_method("Tests.Fixture::Identity", 0, "T"));
    MethodRef {
        name: "Identity".into(),
        declaring_type: fixture(),
        return_type: t.clone(),
        parameters: vec![t],
        has_this: false,
        generic_args: vec![arg],
    }
}

/// `static T IdentityObj<T>.Value(T)` on `IdentityObj<arg>`
pub fn identity_obj_value(arg: TypeRef) -> MethodRef {
    let t = TypeRef::GenericParam(GenericParam::of_type("Tests.IdentityObj`1", 0, "T"));
    method(
        TypeRef::instance("Tests", "IdentityObj`1", vec![arg]),
        "Value",
        false,
        vec![t.clone()],
        t,
    )
}

pub fn list_of(arg: TypeRef) -> TypeRef {
    TypeRef::instance("System.Collections.Generic", "List`1", vec![arg])
}

pub fn list_ctor(arg: TypeRef) -> MethodRef {
    method(list_of(arg), ".ctor", true, vec![], TypeRef::void())
}

pub fn list_add(arg: TypeRef) -> MethodRef {
    let t = TypeRef::GenericParam(GenericParam::of_type("System.Collections.Generic.List`1", 0, "T"));
    method(list_of(arg), "Add", true, vec![t], TypeRef::void())
}

pub fn list_get_item(arg: TypeRef) -> MethodRef {
    let t = TypeRef::GenericParam(GenericParam::of_type("System.Collections.Generic.List`1", 0, "T"));
    method(list_of(arg), "get_Item", true, vec![int32()], t)
}

/// Members of `GenericClass<TIntf, TImpl>` reached through `through`.
pub fn generic_class_ctor(through: TypeRef, params: Vec<TypeRef>) -> MethodRef {
    method(through, ".ctor", true, params, TypeRef::void())
}

pub fn generic_class_get_value(through: TypeRef, name: &str) -> MethodRef {
    method(through, name, true, vec![], TypeRef::GenericParam(tintf()))
}

pub fn generic_class_indexer(through: TypeRef) -> MethodRef {
    method(through, "get_Item", true, vec![int32()], TypeRef::GenericParam(tintf()))
}

pub fn generic_class_explicit(through: TypeRef) -> MethodRef {
    method(
        through,
        "op_Explicit",
        false,
        vec![generic_class_self()],
        TypeRef::GenericParam(tintf()),
    )
}

pub fn generic_class_field(through: TypeRef) -> FieldRef {
    FieldRef {
        name: "m_o".into(),
        declaring_type: through,
        field_type: TypeRef::GenericParam(tintf()),
    }
}

pub fn field(name: &str, ty: TypeRef) -> FieldRef {
    FieldRef {
        name: name.into(),
        declaring_type: fixture(),
        field_type: ty,
    }
}

pub fn s_o() -> FieldRef {
    field("s_o", i_derived())
}

pub fn m_o() -> FieldRef {
    field("m_o", i_derived())
}

// ---- Method bodies ----

/// Assembles a method body instruction by instruction. Branch targets are
/// instruction indices; `label()` returns the index the next instruction
/// will get.
pub struct MethodBuilder {
    name: String,
    declaring_type: TypeRef,
    attributes: MethodAttributes,
    parameters: Vec<ParameterDef>,
    variables: Vec<VariableDef>,
    instructions: Vec<Instruction>,
}

impl MethodBuilder {
    pub fn new(name: &str) -> Self {
        MethodBuilder {
            name: name.into(),
            declaring_type: fixture(),
            attributes: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            parameters: Vec::new(),
            variables: Vec::new(),
            instructions: Vec::new(),
        }
    }

    pub fn instance(mut self) -> Self {
        self.attributes.remove(MethodAttributes::STATIC);
        self
    }

    pub fn declared_in(mut self, ty: TypeRef) -> Self {
        self.declaring_type = ty;
        self
    }

    pub fn param(mut self, ty: TypeRef) -> Self {
        self.parameters.push(ParameterDef {
            name: Some(format!("p{}", self.parameters.len())),
            parameter_type: ty,
        });
        self
    }

    pub fn local(mut self, ty: TypeRef) -> Self {
        let index = self.variables.len() as u16;
        self.variables.push(VariableDef {
            index,
            variable_type: ty,
        });
        self
    }

    pub fn label(&self) -> usize {
        self.instructions.len()
    }

    fn push(mut self, instr: Instruction) -> Self {
        let offset = self.instructions.len() as u32;
        self.instructions.push(instr.at(offset));
        self
    }

    pub fn op(self, opcode: OpCode) -> Self {
        self.push(Instruction::new(opcode))
    }

    pub fn int(self, opcode: OpCode, value: i64) -> Self {
        self.push(Instruction::with_operand(opcode, Operand::Int(value)))
    }

    pub fn float(self, opcode: OpCode, value: f64) -> Self {
        self.push(Instruction::with_operand(opcode, Operand::Float(value)))
    }

    pub fn var(self, opcode: OpCode, index: u16) -> Self {
        self.push(Instruction::with_operand(opcode, Operand::Variable(index)))
    }

    pub fn str(self, value: &str) -> Self {
        self.push(Instruction::with_operand(OpCode::Ldstr, Operand::String(value.into())))
    }

    pub fn call(self, opcode: OpCode, method: MethodRef) -> Self {
        self.push(Instruction::with_operand(opcode, Operand::Method(method)))
    }

    pub fn field(self, opcode: OpCode, field: FieldRef) -> Self {
        self.push(Instruction::with_operand(opcode, Operand::Field(field)))
    }

    pub fn ty(self, opcode: OpCode, ty: TypeRef) -> Self {
        self.push(Instruction::with_operand(opcode, Operand::Type(ty)))
    }

    pub fn branch(self, opcode: OpCode, target: usize) -> Self {
        self.push(Instruction::with_operand(opcode, Operand::Branch(target)))
    }

    pub fn build(self) -> MethodDef {
        let body = MethodBody::new(self.instructions, self.variables).expect("well-formed test body");
        MethodDef {
            name: self.name,
            declaring_type: self.declaring_type,
            attributes: self.attributes,
            parameters: self.parameters,
            return_type: TypeRef::void(),
            body,
        }
    }
}

/// Index of the first call to a method named `name`.
pub fn find_call(method: &MethodDef, name: &str) -> usize {
    method
        .body
        .position(|i| matches!(&i.operand, Operand::Method(m) if m.name == name))
        .unwrap_or_else(|| panic!("no call to {} in {}", name, method.name))
}

// ---- Generic contexts ----

/// Answers from a fixed table and records every query.
#[derive(Default)]
pub struct RecordingContext {
    answers: HashMap<GenericParam, TypeRef>,
    pub queries: RefCell<Vec<GenericParam>>,
}

impl RecordingContext {
    pub fn answering(mut self, param: GenericParam, ty: TypeRef) -> Self {
        self.answers.insert(param, ty);
        self
    }

    pub fn queries(&self) -> Vec<GenericParam> {
        self.queries.borrow().clone()
    }
}

impl GenericContext for RecordingContext {
    fn resolve(&self, param: &GenericParam) -> Option<TypeRef> {
        self.queries.borrow_mut().push(param.clone());
        self.answers.get(param).cloned()
    }
}

/// Fails the test if consulted at all.
pub struct PanickingContext;

impl GenericContext for PanickingContext {
    fn resolve(&self, param: &GenericParam) -> Option<TypeRef> {
        panic!("unexpected generic context query for {}", param)
    }
}
