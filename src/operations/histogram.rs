use anyhow::Result;

use crate::ir::{Class, Method};
use crate::opcodes::Opcode;
use crate::operations::{Operation, OperationMetadata};
use crate::report::{Report, limit_rows, percent};
use crate::table::FrequencyTable;

/// Instruction histogram across all scanned methods.
#[derive(Default)]
pub(crate) struct HistogramOperation {
    counts: FrequencyTable<Opcode>,
}

impl HistogramOperation {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Operation for HistogramOperation {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            id: "histogram",
            description: "Occurrences of each opcode",
        }
    }

    fn process_method(&mut self, _class: &Class, method: &Method) -> Result<()> {
        for inst in &method.instructions {
            self.counts.increment(inst.opcode);
        }
        Ok(())
    }

    fn report(&self, limit: usize) -> Report {
        let total = self.counts.total();
        let mut report = Report::new(self.metadata().id, &["opcode", "count", "percent"]);
        for (opcode, count) in limit_rows(self.counts.by_count(), limit) {
            report.push_row(vec![
                opcode.to_string(),
                count.to_string(),
                percent(count, total),
            ]);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::inst;
    use crate::operations::tests::{class_with_methods, method_with};

    #[test]
    fn counts_opcodes_across_methods() {
        let class = class_with_methods(
            "com/example/App",
            vec![
                method_with("a", vec![inst(Opcode::ALOAD_0, 0), inst(Opcode::ARETURN, 1)]),
                method_with("b", vec![inst(Opcode::ALOAD_0, 0), inst(Opcode::ALOAD_0, 1)]),
                method_with("empty", Vec::new()),
            ],
        );
        let mut operation = HistogramOperation::new();
        for method in &class.methods {
            operation
                .process_method(&class, method)
                .expect("process method");
        }

        assert_eq!(
            "ALOAD_0,3,75.00\nARETURN,1,25.00\n",
            operation.report(0).to_csv()
        );
        assert_eq!(1, operation.report(1).rows.len());
    }
}
