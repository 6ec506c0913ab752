use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;
use crate::opcodes::Opcode;
use crate::report::FIELD_DELIMITER;

/// Canonical identity of an opcode sequence, rendered as `OP1,OP2,...,OPn`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct SequenceKey {
    opcodes: Vec<Opcode>,
}

impl SequenceKey {
    pub(crate) fn new(opcodes: &[Opcode]) -> Self {
        Self {
            opcodes: opcodes.to_vec(),
        }
    }

    /// Parse a comma separated mnemonic list such as `aload,getfield`.
    pub(crate) fn parse(text: &str) -> Result<Self, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyPattern);
        }
        let opcodes = text
            .split(FIELD_DELIMITER)
            .map(Opcode::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { opcodes })
    }

    pub(crate) fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    pub(crate) fn len(&self) -> usize {
        self.opcodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    pub(crate) fn matches(&self, chain: &[Opcode]) -> bool {
        self.opcodes == chain
    }

    pub(crate) fn mnemonics(&self) -> Vec<String> {
        self.opcodes
            .iter()
            .map(|opcode| opcode.mnemonic().to_string())
            .collect()
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonics().join(FIELD_DELIMITER))
    }
}

impl FromStr for SequenceKey {
    type Err = AnalysisError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        SequenceKey::parse(text)
    }
}

// The delimiter sorts below every mnemonic character, so comparing mnemonics
// element-wise orders keys the same way as their canonical strings.
impl Ord for SequenceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.opcodes
            .iter()
            .map(|opcode| opcode.mnemonic())
            .cmp(other.opcodes.iter().map(|opcode| opcode.mnemonic()))
    }
}

impl PartialOrd for SequenceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
