use anyhow::Result;

use crate::error::AnalysisError;
use crate::ir::{Class, Method};
use crate::operations::{Operation, OperationMetadata, site_report};
use crate::report::Report;
use crate::table::{FrequencyTable, SiteKey};

/// Counts allocation sites by allocating opcode and allocated type.
#[derive(Default)]
pub(crate) struct AllocationOperation {
    sites: FrequencyTable<SiteKey>,
}

impl AllocationOperation {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Operation for AllocationOperation {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            id: "allocations",
            description: "Allocation sites grouped by allocated type",
        }
    }

    fn process_method(&mut self, _class: &Class, method: &Method) -> Result<()> {
        let mut found = Vec::new();
        for inst in &method.instructions {
            if !inst.opcode.is_allocation() {
                continue;
            }
            let Some(type_name) = inst.type_param() else {
                return Err(AnalysisError::MalformedBytecode {
                    offset: inst.offset,
                    message: format!("{} without a type operand", inst.opcode),
                }
                .into());
            };
            found.push(SiteKey::new(inst.opcode, type_name));
        }
        for site in found {
            self.sites.increment(site);
        }
        Ok(())
    }

    fn report(&self, limit: usize) -> Report {
        site_report(self.metadata().id, "type", &self.sites, limit)
    }
}
