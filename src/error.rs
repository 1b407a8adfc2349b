use thiserror::Error;

use crate::metadata::GenericParam;

/// Result type for declared-type queries
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while locating a producer or resolving its type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The backward walk ran off the start of the body. The method body or
    /// the start instruction handed to the resolver is malformed.
    #[error("instruction sequence exhausted walking back from #{start} with {remaining} slot(s) left")]
    SequenceExhausted { start: usize, remaining: usize },

    #[error("expression nesting deeper than {depth} levels")]
    NestingTooDeep { depth: usize },

    #[error("no binding for generic parameter {0}")]
    UnresolvedGenericParameter(GenericParam),

    #[error("instruction #{index} is outside a body of {len} instructions")]
    InstructionOutOfRange { index: usize, len: usize },

    #[error("invalid method body: {reason}")]
    InvalidBody { reason: String },

    #[cfg(feature = "decode")]
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors that can occur while decoding a raw code array
#[cfg(feature = "decode")]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("malformed instruction at offset {offset}: {message}")]
    Malformed { offset: u32, message: String },
    #[error("unknown {kind} token {token:#010x} at offset {offset}")]
    UnknownToken {
        kind: &'static str,
        token: u32,
        offset: u32,
    },
    #[error("branch at offset {offset} targets {target}, which is not an instruction boundary")]
    BadBranchTarget { offset: u32, target: i64 },
    #[error("empty code array")]
    Empty,
}
