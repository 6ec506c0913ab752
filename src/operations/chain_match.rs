use anyhow::Result;

use crate::chain::{ChainSink, ChainWalker, WalkStats};
use crate::error::AnalysisError;
use crate::ir::{Class, Method};
use crate::opcodes::Opcode;
use crate::operations::{Operation, OperationMetadata};
use crate::report::{FIELD_DELIMITER, Report, limit_rows};
use crate::sequence::SequenceKey;

/// Where a wanted sequence was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MatchRecord {
    pub(crate) start_offset: u32,
    pub(crate) signature: String,
}

impl MatchRecord {
    fn sort_key(&self) -> String {
        format!("{}{}{}", self.signature, FIELD_DELIMITER, self.start_offset)
    }
}

/// Collects chains equal to one wanted opcode sequence.
#[derive(Clone, Debug)]
pub(crate) struct ChainMatchSink {
    wanted: SequenceKey,
    method: String,
    matches: Vec<MatchRecord>,
}

impl ChainMatchSink {
    pub(crate) fn new(wanted: SequenceKey) -> Self {
        Self {
            wanted,
            method: String::new(),
            matches: Vec::new(),
        }
    }

    /// Attribute subsequent matches to `signature`.
    pub(crate) fn begin_method(&mut self, signature: String) {
        self.method = signature;
    }

    /// Matches sorted by `signature,offset`.
    pub(crate) fn sorted(&self) -> Vec<MatchRecord> {
        let mut sorted = self.matches.clone();
        sorted.sort_by_cached_key(MatchRecord::sort_key);
        sorted
    }
}

impl ChainSink for ChainMatchSink {
    fn on_chain_complete(&mut self, chain: &[Opcode], start_offset: u32) {
        if self.wanted.matches(chain) {
            self.matches.push(MatchRecord {
                start_offset,
                signature: self.method.clone(),
            });
        }
    }
}

/// Finds every place where a given opcode sequence can execute in order.
pub(crate) struct ChainMatchOperation {
    walker: ChainWalker,
    sink: ChainMatchSink,
    stats: WalkStats,
}

impl ChainMatchOperation {
    pub(crate) fn new(wanted: SequenceKey) -> Result<Self, AnalysisError> {
        if wanted.is_empty() {
            return Err(AnalysisError::EmptyPattern);
        }
        Ok(Self {
            walker: ChainWalker::new(wanted.len())?,
            sink: ChainMatchSink::new(wanted),
            stats: WalkStats::default(),
        })
    }
}

impl Operation for ChainMatchOperation {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            id: "search",
            description: "Methods containing an exact opcode sequence",
        }
    }

    fn process_method(&mut self, class: &Class, method: &Method) -> Result<()> {
        self.sink.begin_method(method.signature(&class.name));
        let stats = self.walker.walk(&method.instructions, &mut self.sink);
        self.stats.merge(stats);
        Ok(())
    }

    fn report(&self, limit: usize) -> Report {
        let mut report = Report::new(self.metadata().id, &["method", "offset"]);
        for record in limit_rows(self.sink.sorted(), limit) {
            report.push_row(vec![record.signature, record.start_offset.to_string()]);
        }
        report
    }

    fn walk_stats(&self) -> Option<WalkStats> {
        Some(self.stats)
    }
}
