use std::collections::HashMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::metadata::{GenericOwner, GenericParam, MethodRef, NamedType, TypeRef};

/// Answers generic parameters that no instantiation visible at the use site
/// binds, typically from knowledge of the enclosing instantiation.
pub trait GenericContext {
    fn resolve(&self, param: &GenericParam) -> Option<TypeRef>;
}

impl<F> GenericContext for F
where
    F: Fn(&GenericParam) -> Option<TypeRef>,
{
    fn resolve(&self, param: &GenericParam) -> Option<TypeRef> {
        self(param)
    }
}

/// A context that knows nothing. Queries that need it fail with
/// [`Error::UnresolvedGenericParameter`].
#[derive(Clone, Copy, Debug, Default)]
pub struct NoGenericContext;

impl GenericContext for NoGenericContext {
    fn resolve(&self, _param: &GenericParam) -> Option<TypeRef> {
        None
    }
}

/// Explicit argument lists per generic owner.
#[derive(Clone, Debug, Default)]
pub struct GenericBindings {
    bindings: HashMap<GenericOwner, Vec<TypeRef>>,
}

impl GenericBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the type parameters of `owner` (`Namespace.Name`) positionally.
    pub fn bind_type(mut self, owner: &str, args: Vec<TypeRef>) -> Self {
        self.bindings.insert(GenericOwner::Type(owner.to_string()), args);
        self
    }

    /// Bind the method parameters of `owner` (`Namespace.Type::Method`) positionally.
    pub fn bind_method(mut self, owner: &str, args: Vec<TypeRef>) -> Self {
        self.bindings.insert(GenericOwner::Method(owner.to_string()), args);
        self
    }
}

impl GenericContext for GenericBindings {
    fn resolve(&self, param: &GenericParam) -> Option<TypeRef> {
        self.bindings.get(&param.owner)?.get(param.position as usize).cloned()
    }
}

/// Substitute a generic parameter. `declaring` is the instantiation the
/// type was read through (a field's declaring type, the enclosing type);
/// when it binds the parameter's owner its positional argument wins,
/// otherwise `context` is asked about `ty` itself.
pub fn resolve_generic_type(
    ty: &TypeRef,
    declaring: Option<&TypeRef>,
    context: &impl GenericContext,
) -> Result<TypeRef> {
    let TypeRef::GenericParam(param) = ty else {
        return Ok(ty.clone());
    };

    if let Some(TypeRef::Named(instance)) = declaring {
        if let Some(arg) = match_type_parameter(param, instance) {
            return bound_argument(arg, context);
        }
    }

    ask_context(param, context)
}

/// Type of the value a call pushes. A method-level parameter is bound by the
/// call site's own arguments before the declaring type is consulted. A
/// constructor "returns" the type it constructs.
pub fn resolve_generic_return_type(method: &MethodRef, context: &impl GenericContext) -> Result<TypeRef> {
    let TypeRef::GenericParam(param) = &method.return_type else {
        return Ok(if method.is_constructor() {
            method.declaring_type.clone()
        } else {
            method.return_type.clone()
        });
    };

    if let Some(arg) = match_method_parameter(param, method) {
        return bound_argument(arg, context);
    }

    resolve_generic_type(&method.return_type, Some(&method.declaring_type), context)
}

/// An argument forwarded from an enclosing generic (`Identity<U>` inside
/// `Outer<U>`) is itself a parameter, answered under its own identity.
fn bound_argument(arg: &TypeRef, context: &impl GenericContext) -> Result<TypeRef> {
    match arg {
        TypeRef::GenericParam(forwarded) => ask_context(forwarded, context),
        _ => Ok(arg.clone()),
    }
}

fn ask_context(param: &GenericParam, context: &impl GenericContext) -> Result<TypeRef> {
    debug!(%param, "delegating generic parameter to context");
    context
        .resolve(param)
        .ok_or_else(|| Error::UnresolvedGenericParameter(param.clone()))
}

fn match_type_parameter<'a>(param: &GenericParam, instance: &'a NamedType) -> Option<&'a TypeRef> {
    match &param.owner {
        GenericOwner::Type(owner) if *owner == instance.full_name() => {
            instance.generic_args.get(param.position as usize)
        }
        _ => None,
    }
}

fn match_method_parameter<'a>(param: &GenericParam, method: &'a MethodRef) -> Option<&'a TypeRef> {
    match &param.owner {
        GenericOwner::Method(owner) if *owner == method.full_name() => method.generic_args.get(param.position as usize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn derived() -> TypeRef {
        TypeRef::named("Tests", "IDerived")
    }

    fn tintf() -> GenericParam {
        GenericParam::of_type("Tests.GenericClass`2", 0, "TIntf")
    }

    #[test]
    fn test_non_generic_passes_through() {
        let ty = TypeRef::named("System", "String");
        assert_eq!(resolve_generic_type(&ty, None, &NoGenericContext), Ok(ty));
    }

    #[test]
    fn test_declaring_instance_binds() {
        let instance = TypeRef::instance("Tests", "GenericClass`2", vec![derived(), TypeRef::named("Tests", "Derived")]);
        let ty = TypeRef::GenericParam(tintf());
        assert_eq!(resolve_generic_type(&ty, Some(&instance), &NoGenericContext), Ok(derived()));
    }

    #[test]
    fn test_other_owner_falls_back_to_context() {
        let instance = TypeRef::instance("Tests", "Other`2", vec![TypeRef::named("System", "Int32")]);
        let ty = TypeRef::GenericParam(tintf());
        let queries = RefCell::new(Vec::new());
        let context = |param: &GenericParam| {
            queries.borrow_mut().push(param.clone());
            Some(derived())
        };
        assert_eq!(resolve_generic_type(&ty, Some(&instance), &context), Ok(derived()));
        assert_eq!(queries.into_inner(), vec![tintf()]);
    }

    #[test]
    fn test_unanswered_parameter_is_an_error() {
        let ty = TypeRef::GenericParam(tintf());
        assert_eq!(
            resolve_generic_type(&ty, None, &NoGenericContext),
            Err(Error::UnresolvedGenericParameter(tintf()))
        );
    }

    #[test]
    fn test_position_out_of_instance_range() {
        let instance = TypeRef::instance("Tests", "GenericClass`2", vec![derived()]);
        let ty = TypeRef::GenericParam(GenericParam::of_type("Tests.GenericClass`2", 1, "TImpl"));
        let bindings = GenericBindings::new().bind_type("Tests.GenericClass`2", vec![derived(), TypeRef::named("Tests", "Derived")]);
        assert_eq!(
            resolve_generic_type(&ty, Some(&instance), &bindings),
            Ok(TypeRef::named("Tests", "Derived"))
        );
    }

    #[test]
    fn test_self_instantiation_defers_to_context() {
        let this = TypeRef::instance(
            "Tests",
            "GenericClass`2",
            vec![
                TypeRef::GenericParam(tintf()),
                TypeRef::GenericParam(GenericParam::of_type("Tests.GenericClass`2", 1, "TImpl")),
            ],
        );
        let ty = TypeRef::GenericParam(tintf());
        let bindings = GenericBindings::new().bind_type("Tests.GenericClass`2", vec![derived()]);
        assert_eq!(resolve_generic_type(&ty, Some(&this), &bindings), Ok(derived()));
    }

    #[test]
    fn test_forwarded_argument_asks_under_its_own_identity() {
        let u = GenericParam::of_type("Tests.Outer`1", 0, "U");
        let instance = TypeRef::instance("Tests", "GenericClass`2", vec![TypeRef::GenericParam(u.clone())]);
        let ty = TypeRef::GenericParam(tintf());
        let bindings = GenericBindings::new().bind_type("Tests.Outer`1", vec![derived()]);
        assert_eq!(resolve_generic_type(&ty, Some(&instance), &bindings), Ok(derived()));
        assert_eq!(
            resolve_generic_type(&ty, Some(&instance), &NoGenericContext),
            Err(Error::UnresolvedGenericParameter(u))
        );
    }

    #[test]
    fn test_method_level_argument_first() {
        let t = GenericParam::of_method("Tests.Fixture::Identity", 0, "T");
        let call = MethodRef {
            name: "Identity".into(),
            declaring_type: TypeRef::named("Tests", "Fixture"),
            return_type: TypeRef::GenericParam(t),
            parameters: vec![],
            has_this: false,
            generic_args: vec![derived()],
        };
        assert_eq!(resolve_generic_return_type(&call, &NoGenericContext), Ok(derived()));
    }

    #[test]
    fn test_method_bindings() {
        let t = GenericParam::of_method("Tests.Fixture::Identity", 0, "T");
        let bindings = GenericBindings::new().bind_method("Tests.Fixture::Identity", vec![derived()]);
        assert_eq!(bindings.resolve(&t), Some(derived()));
        assert_eq!(bindings.resolve(&tintf()), None);
    }

    #[test]
    fn test_constructor_returns_declaring_type() {
        let instance = TypeRef::instance("Tests", "GenericClass`2", vec![derived(), TypeRef::named("Tests", "Derived")]);
        let ctor = MethodRef {
            name: ".ctor".into(),
            declaring_type: instance.clone(),
            return_type: TypeRef::void(),
            parameters: vec![],
            has_this: true,
            generic_args: vec![],
        };
        assert_eq!(resolve_generic_return_type(&ctor, &NoGenericContext), Ok(instance));
    }
}
