use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::AnalysisError;
use crate::ir::Instruction;
use crate::opcodes::Opcode;

/// Receiver for chains that reached the walker's bound.
pub(crate) trait ChainSink {
    fn on_chain_complete(&mut self, chain: &[Opcode], start_offset: u32);
}

/// Outcome counters for one call to [`ChainWalker::walk`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct WalkStats {
    /// One per start index, whatever the outcome.
    pub(crate) attempts: usize,
    pub(crate) emitted: usize,
    /// Attempts ended by a return or throw before the bound was reached.
    pub(crate) terminated: usize,
    /// Attempts discarded because control flow could not be followed.
    pub(crate) abandoned: usize,
    /// Subset of `abandoned` caused by a goto whose target is not an instruction.
    pub(crate) malformed_targets: usize,
}

impl WalkStats {
    pub(crate) fn merge(&mut self, other: WalkStats) {
        self.attempts += other.attempts;
        self.emitted += other.emitted;
        self.terminated += other.terminated;
        self.abandoned += other.abandoned;
        self.malformed_targets += other.malformed_targets;
    }
}

/// Where an attempt goes after the current instruction.
enum Next {
    Cursor(usize),
    Malformed(AnalysisError),
}

/// Enumerates bounded straight-line opcode chains through a method body.
///
/// Every instruction index starts its own attempt. An attempt appends opcodes
/// while following gotos, falls through conditional branches and switches, ends
/// at returns and `athrow`, and gives up on subroutine instructions. Chains are
/// handed to the sink only when they hold exactly `bound` opcodes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ChainWalker {
    bound: usize,
}

impl ChainWalker {
    pub(crate) fn new(bound: usize) -> Result<Self, AnalysisError> {
        if bound == 0 {
            return Err(AnalysisError::InvalidChainLength(bound));
        }
        Ok(Self { bound })
    }

    /// Walker for two-opcode chains, i.e. instruction successors.
    pub(crate) fn pairs() -> Self {
        Self { bound: 2 }
    }

    pub(crate) fn bound(&self) -> usize {
        self.bound
    }

    pub(crate) fn walk(&self, instructions: &[Instruction], sink: &mut dyn ChainSink) -> WalkStats {
        let index_of: HashMap<u32, usize> = instructions
            .iter()
            .enumerate()
            .map(|(index, inst)| (inst.offset, index))
            .collect();

        let mut stats = WalkStats::default();
        for start in 0..instructions.len() {
            stats.attempts += 1;
            self.attempt(instructions, &index_of, start, sink, &mut stats);
        }
        stats
    }

    fn attempt(
        &self,
        instructions: &[Instruction],
        index_of: &HashMap<u32, usize>,
        start: usize,
        sink: &mut dyn ChainSink,
        stats: &mut WalkStats,
    ) {
        let start_offset = instructions[start].offset;
        let mut chain = Vec::with_capacity(self.bound.min(instructions.len()));
        let mut visited = HashSet::new();
        let mut cursor = start;

        loop {
            let Some(inst) = instructions.get(cursor) else {
                // Fell off the end of the code without a terminal instruction.
                stats.abandoned += 1;
                return;
            };
            visited.insert(inst.offset);
            chain.push(inst.opcode);

            if inst.opcode.is_subroutine() {
                stats.abandoned += 1;
                return;
            }
            if chain.len() == self.bound {
                sink.on_chain_complete(&chain, start_offset);
                stats.emitted += 1;
                return;
            }
            if inst.opcode.is_terminal() {
                stats.terminated += 1;
                return;
            }

            match next_cursor(inst, cursor, index_of, &visited) {
                Next::Cursor(next) => cursor = next,
                Next::Malformed(err) => {
                    debug!(start_offset, "abandoning chain: {err}");
                    stats.abandoned += 1;
                    stats.malformed_targets += 1;
                    return;
                }
            }
        }
    }
}

fn next_cursor(
    inst: &Instruction,
    cursor: usize,
    index_of: &HashMap<u32, usize>,
    visited: &HashSet<u32>,
) -> Next {
    if !inst.opcode.is_goto() {
        return Next::Cursor(cursor + 1);
    }
    let Some(target) = inst.numeric_param() else {
        return Next::Malformed(AnalysisError::MalformedBytecode {
            offset: inst.offset,
            message: format!("{} without a target", inst.opcode),
        });
    };
    let Ok(target) = u32::try_from(target) else {
        return Next::Malformed(AnalysisError::MalformedBytecode {
            offset: inst.offset,
            message: format!("negative branch target {target}"),
        });
    };
    if visited.contains(&target) {
        // Jumping back would loop; stay on the goto until the bound is hit.
        return Next::Cursor(cursor);
    }
    match index_of.get(&target) {
        Some(index) => Next::Cursor(*index),
        None => Next::Malformed(AnalysisError::MalformedBytecode {
            offset: inst.offset,
            message: format!("branch target {target} is not an instruction"),
        }),
    }
}
