use anyhow::Result;

use crate::chain::{ChainSink, ChainWalker, WalkStats};
use crate::error::AnalysisError;
use crate::ir::{Class, Method};
use crate::opcodes::Opcode;
use crate::operations::{Operation, OperationMetadata};
use crate::report::{Report, limit_rows};
use crate::sequence::SequenceKey;
use crate::table::{FrequencyTable, SortOrder};

/// Frequency table of completed chains keyed by their canonical sequence.
#[derive(Clone, Debug, Default)]
pub(crate) struct ChainCountSink {
    table: FrequencyTable<SequenceKey>,
}

impl ChainCountSink {
    pub(crate) fn table(&self) -> &FrequencyTable<SequenceKey> {
        &self.table
    }

    pub(crate) fn sorted(&self, order: SortOrder) -> Vec<(SequenceKey, u64)> {
        self.table.sorted(order)
    }
}

impl ChainSink for ChainCountSink {
    fn on_chain_complete(&mut self, chain: &[Opcode], _start_offset: u32) {
        self.table.increment(SequenceKey::new(chain));
    }
}

/// Counts every opcode chain of a fixed length across all scanned methods.
pub(crate) struct ChainCountOperation {
    walker: ChainWalker,
    sink: ChainCountSink,
    sort: SortOrder,
    stats: WalkStats,
}

impl ChainCountOperation {
    pub(crate) fn new(chain_length: usize, sort: SortOrder) -> Result<Self, AnalysisError> {
        Ok(Self {
            walker: ChainWalker::new(chain_length)?,
            sink: ChainCountSink::default(),
            sort,
            stats: WalkStats::default(),
        })
    }
}

impl Operation for ChainCountOperation {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            id: "chains",
            description: "Frequency of control-flow-aware opcode chains",
        }
    }

    fn process_method(&mut self, _class: &Class, method: &Method) -> Result<()> {
        let stats = self.walker.walk(&method.instructions, &mut self.sink);
        self.stats.merge(stats);
        Ok(())
    }

    fn report(&self, limit: usize) -> Report {
        let mut columns = (1..=self.walker.bound())
            .map(|position| format!("opcode{position}"))
            .collect::<Vec<_>>();
        columns.push("count".to_string());
        let columns = columns.iter().map(String::as_str).collect::<Vec<_>>();

        let mut report = Report::new(self.metadata().id, &columns);
        for (key, count) in limit_rows(self.sink.sorted(self.sort), limit) {
            let mut row = key.mnemonics();
            row.push(count.to_string());
            report.push_row(row);
        }
        report
    }

    fn walk_stats(&self) -> Option<WalkStats> {
        Some(self.stats)
    }
}
