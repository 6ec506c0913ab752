use anyhow::Result;

use crate::error::AnalysisError;
use crate::ir::{Class, Method};
use crate::operations::{Operation, OperationMetadata, site_report};
use crate::report::Report;
use crate::table::{FrequencyTable, SiteKey};

/// Counts call sites by invoke opcode and resolved target signature.
#[derive(Default)]
pub(crate) struct InvocationOperation {
    sites: FrequencyTable<SiteKey>,
}

impl InvocationOperation {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Operation for InvocationOperation {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            id: "invocations",
            description: "Call sites grouped by invoked method",
        }
    }

    fn process_method(&mut self, _class: &Class, method: &Method) -> Result<()> {
        let mut found = Vec::new();
        for inst in &method.instructions {
            if !inst.opcode.is_invocation() {
                continue;
            }
            let member = inst
                .member_param()
                .ok_or_else(|| AnalysisError::MalformedBytecode {
                    offset: inst.offset,
                    message: format!("{} without a method reference", inst.opcode),
                })?;
            found.push(SiteKey::new(inst.opcode, member.signature()));
        }
        for site in found {
            self.sites.increment(site);
        }
        Ok(())
    }

    fn report(&self, limit: usize) -> Report {
        site_report(self.metadata().id, "method", &self.sites, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, MemberRef, Param};
    use crate::opcodes::Opcode;
    use crate::operations::tests::{class_with_methods, method_with};

    fn call(
        opcode: Opcode,
        offset: u32,
        owner: Option<&str>,
        name: &str,
        descriptor: &str,
    ) -> Instruction {
        Instruction::new(opcode, offset).with_param(Param::Member(MemberRef {
            owner: owner.map(str::to_string),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }))
    }

    #[test]
    fn counts_call_sites_by_signature() {
        let method = method_with(
            "run",
            vec![
                Instruction::new(Opcode::ALOAD_0, 0),
                call(Opcode::INVOKESPECIAL, 1, Some("java/lang/Object"), "<init>", "()V"),
                call(Opcode::INVOKESTATIC, 4, Some("a/Util"), "log", "()V"),
                call(Opcode::INVOKESTATIC, 7, Some("a/Util"), "log", "()V"),
                call(Opcode::INVOKEDYNAMIC, 10, None, "run", "()Ljava/lang/Runnable;"),
                Instruction::new(Opcode::RETURN, 15),
            ],
        );
        let class = class_with_methods("com/example/App", vec![method]);
        let mut operation = InvocationOperation::new();

        operation
            .process_method(&class, &class.methods[0])
            .expect("process method");

        let report = operation.report(0);
        assert_eq!(vec!["opcode", "method", "count"], report.columns);
        assert_eq!(
            "INVOKESTATIC,a/Util.log()V,2\nINVOKESPECIAL,java/lang/Object.<init>()V,1\n\
             INVOKEDYNAMIC,run ()Ljava/lang/Runnable;,1\n",
            report.to_csv()
        );
    }

    #[test]
    fn unresolved_call_site_is_an_error() {
        let method = method_with(
            "run",
            vec![
                Instruction::new(Opcode::INVOKEVIRTUAL, 0),
                Instruction::new(Opcode::RETURN, 3),
            ],
        );
        let class = class_with_methods("com/example/App", vec![method]);

        let result = InvocationOperation::new().process_method(&class, &class.methods[0]);

        assert!(result.is_err());
    }
}
