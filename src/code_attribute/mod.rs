mod types;

#[cfg(feature = "decode")]
mod parser;

pub use self::types::*;

#[cfg(feature = "decode")]
pub use self::parser::*;
