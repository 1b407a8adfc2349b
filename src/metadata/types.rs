use std::fmt;
use std::hash::{Hash, Hasher};

use crate::code_attribute::Instruction;

/// A static type annotation as it appears in metadata signatures.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(NamedType),
    GenericParam(GenericParam),
    /// `T[]`
    Array(Box<TypeRef>),
    /// `T&`, a managed reference to a `T` slot
    ByRef(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(namespace: &str, name: &str) -> Self {
        TypeRef::Named(NamedType::new(namespace, name))
    }

    /// A generic instantiation `name<args...>`.
    pub fn instance(namespace: &str, name: &str, args: Vec<TypeRef>) -> Self {
        TypeRef::Named(NamedType {
            namespace: namespace.to_string(),
            name: name.to_string(),
            generic_args: args,
        })
    }

    pub fn array_of(element: TypeRef) -> Self {
        TypeRef::Array(Box::new(element))
    }

    pub fn by_ref(referent: TypeRef) -> Self {
        TypeRef::ByRef(Box::new(referent))
    }

    /// The sentinel return type of methods that push nothing.
    pub fn void() -> Self {
        TypeRef::named("System", "Void")
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Named(n) if n.namespace == "System" && n.name == "Void" && n.generic_args.is_empty())
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(n) => write!(f, "{}", n),
            TypeRef::GenericParam(gp) => write!(f, "{}", gp),
            TypeRef::Array(inner) => write!(f, "{}[]", inner),
            TypeRef::ByRef(inner) => write!(f, "{}&", inner),
        }
    }
}

/// A concrete named type. A non-empty `generic_args` list makes this an
/// instantiation of the generic definition with the same namespace and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamedType {
    pub namespace: String,
    pub name: String,
    pub generic_args: Vec<TypeRef>,
}

impl NamedType {
    pub fn new(namespace: &str, name: &str) -> Self {
        NamedType {
            namespace: namespace.to_string(),
            name: name.to_string(),
            generic_args: Vec::new(),
        }
    }

    /// `Namespace.Name` of the element (uninstantiated) type.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for NamedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())?;
        if !self.generic_args.is_empty() {
            let args: Vec<String> = self.generic_args.iter().map(|a| a.to_string()).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        Ok(())
    }
}

/// Who declares a generic parameter, by full name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GenericOwner {
    /// Declared on a type, e.g. `T` in `List<T>`. Holds `Namespace.Name`.
    Type(String),
    /// Declared on a method, e.g. `T` in `Identity<T>(T)`. Holds `Namespace.Type::Method`.
    Method(String),
}

/// An open generic parameter. Identity is the owner and the zero-based
/// position; the name only serves diagnostics.
#[derive(Clone, Debug)]
pub struct GenericParam {
    pub owner: GenericOwner,
    pub position: u16,
    pub name: Option<String>,
}

impl GenericParam {
    pub fn of_type(owner: &str, position: u16, name: &str) -> Self {
        GenericParam {
            owner: GenericOwner::Type(owner.to_string()),
            position,
            name: Some(name.to_string()),
        }
    }

    pub fn of_method(owner: &str, position: u16, name: &str) -> Self {
        GenericParam {
            owner: GenericOwner::Method(owner.to_string()),
            position,
            name: Some(name.to_string()),
        }
    }

    pub fn is_method_level(&self) -> bool {
        matches!(self.owner, GenericOwner::Method(_))
    }

    fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None if self.is_method_level() => format!("!!{}", self.position),
            None => format!("!{}", self.position),
        }
    }
}

impl PartialEq for GenericParam {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.position == other.position
    }
}

impl Eq for GenericParam {}

impl Hash for GenericParam {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.position.hash(state);
    }
}

impl fmt::Display for GenericParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = match &self.owner {
            GenericOwner::Type(name) | GenericOwner::Method(name) => name,
        };
        write!(f, "{} (position {} of {})", self.display_name(), self.position, owner)
    }
}

/// A reference to a method as seen at a call site.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodRef {
    pub name: String,
    pub declaring_type: TypeRef,
    pub return_type: TypeRef,
    pub parameters: Vec<TypeRef>,
    /// Whether the callee takes an implicit receiver.
    pub has_this: bool,
    /// Method-level instantiation supplied by the call site, if generic.
    pub generic_args: Vec<TypeRef>,
}

impl MethodRef {
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor"
    }

    /// `Namespace.Type::Name`, the owner identity of the method's own
    /// generic parameters.
    pub fn full_name(&self) -> String {
        let declaring = match &self.declaring_type {
            TypeRef::Named(n) => n.full_name(),
            other => other.to_string(),
        };
        format!("{}::{}", declaring, self.name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldRef {
    pub name: String,
    pub declaring_type: TypeRef,
    pub field_type: TypeRef,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodAttributes(u16);

bitflags! {
    impl MethodAttributes: u16 {
        const PRIVATE = 0x0001;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const FINAL = 0x0020;
        const VIRTUAL = 0x0040;
        const HIDE_BY_SIG = 0x0080;
        const ABSTRACT = 0x0400;
        const SPECIAL_NAME = 0x0800;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterDef {
    pub name: Option<String>,
    pub parameter_type: TypeRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDef {
    pub index: u16,
    pub variable_type: TypeRef,
}

/// The instruction stream and local variable table of a method.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodBody {
    instructions: Vec<Instruction>,
    pub variables: Vec<VariableDef>,
}

impl MethodBody {
    /// Wrap a decoded instruction sequence. The sequence must be non-empty
    /// and every branch must land inside it.
    pub fn new(instructions: Vec<Instruction>, variables: Vec<VariableDef>) -> crate::Result<Self> {
        if instructions.is_empty() {
            return Err(crate::Error::InvalidBody {
                reason: "empty instruction sequence".into(),
            });
        }
        let len = instructions.len();
        for (idx, instr) in instructions.iter().enumerate() {
            if let Some(target) = instr.branch_targets().into_iter().find(|&t| t >= len) {
                return Err(crate::Error::InvalidBody {
                    reason: format!("instruction #{} branches to #{} past the end ({})", idx, target, len),
                });
            }
        }
        Ok(MethodBody {
            instructions,
            variables,
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn variable(&self, index: u16) -> Option<&VariableDef> {
        self.variables.iter().find(|v| v.index == index)
    }

    /// Index of the first instruction matching `pred`.
    pub fn position(&self, pred: impl Fn(&Instruction) -> bool) -> Option<usize> {
        self.instructions.iter().position(pred)
    }
}

/// A method definition together with its body.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodDef {
    pub name: String,
    pub declaring_type: TypeRef,
    pub attributes: MethodAttributes,
    pub parameters: Vec<ParameterDef>,
    pub return_type: TypeRef,
    pub body: MethodBody,
}

impl MethodDef {
    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    /// Declared type of the formal parameter behind raw argument slot `slot`.
    /// Slot 0 of an instance method is the implicit receiver and has no
    /// entry in the parameter list.
    pub fn parameter_for_slot(&self, slot: u16) -> Option<&ParameterDef> {
        let index = if self.is_static() {
            slot as usize
        } else {
            (slot as usize).checked_sub(1)?
        };
        self.parameters.get(index)
    }
}
