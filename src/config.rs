use crate::error::AnalysisError;
use crate::sequence::SequenceKey;
use crate::table::SortOrder;

/// Which analysis a run performs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum OperationKind {
    Histogram,
    Chains,
    Next,
    Search,
    Allocations,
    Invocations,
}

/// Settings for one analysis run, resolved from the command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct AnalysisConfig {
    pub(crate) operation: OperationKind,
    /// Bound for the chain walker of the `chains` operation.
    pub(crate) chain_length: usize,
    /// Maximum report rows; 0 means unlimited.
    pub(crate) result_limit: usize,
    pub(crate) wanted_sequence: Option<SequenceKey>,
    /// Methods with fewer code bytes are skipped.
    pub(crate) min_method_size: u32,
    pub(crate) sort: SortOrder,
    pub(crate) percentages: bool,
}

impl AnalysisConfig {
    pub(crate) fn new(operation: OperationKind) -> Self {
        Self {
            operation,
            chain_length: 2,
            result_limit: 0,
            wanted_sequence: None,
            min_method_size: 0,
            sort: SortOrder::Count,
            percentages: false,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), AnalysisError> {
        if self.chain_length == 0 {
            return Err(AnalysisError::InvalidChainLength(self.chain_length));
        }
        if self.operation == OperationKind::Search
            && self
                .wanted_sequence
                .as_ref()
                .is_none_or(|wanted| wanted.is_empty())
        {
            return Err(AnalysisError::EmptyPattern);
        }
        Ok(())
    }
}
