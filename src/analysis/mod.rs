//! Backward stack analysis over a decoded method body.

pub mod declared_type;
pub mod generics;
pub mod locator;
pub mod normalize;
pub mod stack_calc;

pub use declared_type::{declared_type_of_this_object, get_declared_type, get_declared_type_with, ResolveOptions};
pub use generics::{GenericBindings, GenericContext, NoGenericContext};
