use std::collections::HashMap;

use anyhow::Result;

use crate::chain::{ChainWalker, WalkStats};
use crate::ir::{Class, Method};
use crate::opcodes::Opcode;
use crate::operations::chain_count::ChainCountSink;
use crate::operations::{Operation, OperationMetadata};
use crate::report::{Report, limit_rows, percent};
use crate::table::FrequencyTable;

/// Successor opcodes of a root opcode, most frequent first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct NextOpcodes {
    pub(crate) root: Opcode,
    pub(crate) total: u64,
    pub(crate) children: Vec<(Opcode, u64)>,
}

/// "Which instruction follows X" statistics built from two-opcode chains.
pub(crate) struct NextOpcodeOperation {
    walker: ChainWalker,
    sink: ChainCountSink,
    percentages: bool,
    stats: WalkStats,
}

impl NextOpcodeOperation {
    pub(crate) fn new(percentages: bool) -> Self {
        Self {
            walker: ChainWalker::pairs(),
            sink: ChainCountSink::default(),
            percentages,
            stats: WalkStats::default(),
        }
    }

    /// Group pair counts by their first opcode. Roots are ordered by their
    /// total, children by count; `limit` caps the children kept per root.
    pub(crate) fn grouped(&self, limit: usize) -> Vec<NextOpcodes> {
        let mut roots: FrequencyTable<Opcode> = FrequencyTable::new();
        let mut children: HashMap<Opcode, FrequencyTable<Opcode>> = HashMap::new();
        for (key, count) in self.sink.table().iter() {
            let [root, child] = key.opcodes() else {
                continue;
            };
            roots.add(*root, count);
            children.entry(*root).or_default().add(*child, count);
        }

        roots
            .by_count()
            .into_iter()
            .map(|(root, total)| NextOpcodes {
                root,
                total,
                children: children
                    .get(&root)
                    .map(|table| limit_rows(table.by_count(), limit))
                    .unwrap_or_default(),
            })
            .collect()
    }
}

impl Operation for NextOpcodeOperation {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            id: "next",
            description: "Most frequent successors of each opcode",
        }
    }

    fn process_method(&mut self, _class: &Class, method: &Method) -> Result<()> {
        let stats = self.walker.walk(&method.instructions, &mut self.sink);
        self.stats.merge(stats);
        Ok(())
    }

    fn report(&self, limit: usize) -> Report {
        let columns: &[&str] = if self.percentages {
            &["root", "next", "count", "sum", "percent"]
        } else {
            &["root", "next", "count"]
        };
        let mut report = Report::new(self.metadata().id, columns);
        for group in self.grouped(limit) {
            for (child, count) in &group.children {
                let mut row = vec![
                    group.root.to_string(),
                    child.to_string(),
                    count.to_string(),
                ];
                if self.percentages {
                    row.push(group.total.to_string());
                    row.push(percent(*count, group.total));
                }
                report.push_row(row);
            }
        }
        report
    }

    fn walk_stats(&self) -> Option<WalkStats> {
        Some(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::inst;
    use crate::operations::tests::{class_with_methods, method_with};

    fn scanned(percentages: bool) -> NextOpcodeOperation {
        let class = class_with_methods(
            "com/example/App",
            vec![
                method_with(
                    "a",
                    vec![
                        inst(Opcode::ALOAD_0, 0),
                        inst(Opcode::GETFIELD, 1),
                        inst(Opcode::ARETURN, 4),
                    ],
                ),
                method_with(
                    "b",
                    vec![
                        inst(Opcode::ALOAD_0, 0),
                        inst(Opcode::GETFIELD, 1),
                        inst(Opcode::ALOAD_0, 4),
                        inst(Opcode::ARETURN, 5),
                    ],
                ),
            ],
        );
        let mut operation = NextOpcodeOperation::new(percentages);
        for method in &class.methods {
            operation
                .process_method(&class, method)
                .expect("process method");
        }
        operation
    }

    #[test]
    fn groups_successors_by_root() {
        let groups = scanned(false).grouped(0);

        assert_eq!(
            vec![
                NextOpcodes {
                    root: Opcode::ALOAD_0,
                    total: 3,
                    children: vec![(Opcode::GETFIELD, 2), (Opcode::ARETURN, 1)],
                },
                NextOpcodes {
                    root: Opcode::GETFIELD,
                    total: 2,
                    children: vec![(Opcode::ARETURN, 1), (Opcode::ALOAD_0, 1)],
                },
            ],
            groups
        );
    }

    #[test]
    fn limit_caps_children_per_root() {
        let rows = scanned(false).report(1).rows;

        assert_eq!(
            vec![
                vec!["ALOAD_0", "GETFIELD", "2"],
                vec!["GETFIELD", "ARETURN", "1"],
            ],
            rows
        );
    }

    #[test]
    fn percentages_add_sum_and_share() {
        let report = scanned(true).report(0);

        assert_eq!(
            "ALOAD_0,GETFIELD,2,3,66.67\nALOAD_0,ARETURN,1,3,33.33\n\
             GETFIELD,ARETURN,1,2,50.00\nGETFIELD,ALOAD_0,1,2,50.00\n",
            report.to_csv()
        );
    }
}
