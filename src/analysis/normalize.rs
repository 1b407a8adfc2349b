use crate::metadata::TypeRef;

/// Strip array and by-ref wrappers: the value observed at a use site is the
/// element or referent, not the slot's wrapper type.
pub fn normalize(mut ty: &TypeRef) -> &TypeRef {
    while let TypeRef::Array(inner) | TypeRef::ByRef(inner) = ty {
        ty = inner.as_ref();
    }
    ty
}
