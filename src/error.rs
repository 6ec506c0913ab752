use thiserror::Error;

/// Domain errors raised by the chain analysis core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum AnalysisError {
    /// A search pattern names an opcode that does not exist.
    #[error("unknown opcode mnemonic: {0:?}")]
    UnknownMnemonic(String),

    /// A search pattern contains no opcodes at all.
    #[error("search pattern is empty")]
    EmptyPattern,

    /// Chains must contain at least one opcode.
    #[error("chain length must be positive, got {0}")]
    InvalidChainLength(usize),

    /// Decoded bytecode refers to something that is not there.
    #[error("malformed bytecode at offset {offset}: {message}")]
    MalformedBytecode { offset: u32, message: String },
}
