use anyhow::Result;
use tracing::{debug, warn};

use crate::chain::WalkStats;
use crate::config::{AnalysisConfig, OperationKind};
use crate::error::AnalysisError;
use crate::ir::{Class, Method};
use crate::report::{Report, limit_rows};
use crate::table::{FrequencyTable, SiteKey};

pub(crate) mod allocation;
pub(crate) mod chain_count;
pub(crate) mod chain_match;
pub(crate) mod histogram;
pub(crate) mod invocation;
pub(crate) mod next_opcode;

use allocation::AllocationOperation;
use chain_count::ChainCountOperation;
use chain_match::ChainMatchOperation;
use histogram::HistogramOperation;
use invocation::InvocationOperation;
use next_opcode::NextOpcodeOperation;

/// Metadata describing an analysis operation.
#[derive(Clone, Debug)]
pub(crate) struct OperationMetadata {
    pub(crate) id: &'static str,
    pub(crate) description: &'static str,
}

/// One analysis pass over method bytecode. An instance owns its accumulated
/// results for the whole scan and is not shared between threads.
pub(crate) trait Operation {
    fn metadata(&self) -> OperationMetadata;
    fn process_method(&mut self, class: &Class, method: &Method) -> Result<()>;
    fn report(&self, limit: usize) -> Report;

    /// Chain walker counters, for operations that walk chains.
    fn walk_stats(&self) -> Option<WalkStats> {
        None
    }
}

/// Counts for one run of an operation over a set of classes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct RunSummary {
    pub(crate) processed_methods: usize,
    pub(crate) small_methods: usize,
    pub(crate) failed_methods: usize,
}

pub(crate) fn build_operation(
    config: &AnalysisConfig,
) -> Result<Box<dyn Operation>, AnalysisError> {
    let operation: Box<dyn Operation> = match config.operation {
        OperationKind::Histogram => Box::new(HistogramOperation::new()),
        OperationKind::Chains => Box::new(ChainCountOperation::new(
            config.chain_length,
            config.sort,
        )?),
        OperationKind::Next => Box::new(NextOpcodeOperation::new(config.percentages)),
        OperationKind::Search => {
            let wanted = config
                .wanted_sequence
                .clone()
                .ok_or(AnalysisError::EmptyPattern)?;
            Box::new(ChainMatchOperation::new(wanted)?)
        }
        OperationKind::Allocations => Box::new(AllocationOperation::new()),
        OperationKind::Invocations => Box::new(InvocationOperation::new()),
    };
    Ok(operation)
}

/// Feed every method that meets the size threshold to `operation`. A method
/// that fails is reported and skipped; the run carries on with the rest.
pub(crate) fn run_operation(
    operation: &mut dyn Operation,
    classes: &[Class],
    min_method_size: u32,
) -> RunSummary {
    let metadata = operation.metadata();
    let id = metadata.id;
    debug!(operation = id, "{}", metadata.description);
    let mut summary = RunSummary::default();
    for class in classes {
        for method in &class.methods {
            if method.code_length < min_method_size {
                summary.small_methods += 1;
                continue;
            }
            match operation.process_method(class, method) {
                Ok(()) => summary.processed_methods += 1,
                Err(err) => {
                    warn!(
                        operation = id,
                        method = %method.signature(&class.name),
                        "skipping method: {err:#}"
                    );
                    summary.failed_methods += 1;
                }
            }
        }
    }
    debug!(operation = id, ?summary, "operation finished");
    summary
}

/// Rows of `OPCODE,target,count`, most frequent first.
pub(crate) fn site_report(
    id: &str,
    target_column: &str,
    sites: &FrequencyTable<SiteKey>,
    limit: usize,
) -> Report {
    let mut report = Report::new(id, &["opcode", target_column, "count"]);
    for (site, count) in limit_rows(sites.by_count(), limit) {
        report.push_row(vec![site.opcode.to_string(), site.target, count.to_string()]);
    }
    report
}
