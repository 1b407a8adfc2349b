//! Limits shared by the backward walk.

/// Maximum nesting of sub-expressions the locator will unwind.
///
/// Every operand-consuming producer met on the way back (a nested call, an
/// arithmetic operator, an array load) opens one level of recursion. Real
/// method bodies nest a handful of levels deep; a body that goes past this
/// is either generated garbage or a walk that started at the wrong place.
///
/// ```text
/// Identity(Identity(Identity(/* ... 512 levels ... */ x))).Method();
/// ```
pub const MAX_EXPRESSION_NESTING_DEPTH: usize = 512;
