use crate::opcodes::Opcode;

/// Intermediate representation for a parsed JVM class.
#[derive(Clone, Debug)]
pub(crate) struct Class {
    pub(crate) name: String,
    pub(crate) methods: Vec<Method>,
}

/// Intermediate representation for a method and its decoded bytecode.
#[derive(Clone, Debug)]
pub(crate) struct Method {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) code_length: u32,
    pub(crate) instructions: Vec<Instruction>,
}

impl Method {
    /// Identity used to attribute results to this method, e.g. `com/example/App.run()V`.
    pub(crate) fn signature(&self, class_name: &str) -> String {
        format!("{class_name}.{}{}", self.name, self.descriptor)
    }
}

/// One decoded bytecode instruction. Never mutated after decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Instruction {
    pub(crate) opcode: Opcode,
    pub(crate) offset: u32,
    pub(crate) params: Vec<Param>,
    pub(crate) comment: Option<String>,
}

impl Instruction {
    pub(crate) fn new(opcode: Opcode, offset: u32) -> Self {
        Self {
            opcode,
            offset,
            params: Vec::new(),
            comment: None,
        }
    }

    pub(crate) fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub(crate) fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// First numeric operand; for branches this is the absolute target offset.
    pub(crate) fn numeric_param(&self) -> Option<i64> {
        self.params.iter().find_map(|param| match param {
            Param::Numeric(value) => Some(*value),
            _ => None,
        })
    }

    pub(crate) fn type_param(&self) -> Option<&str> {
        self.params.iter().find_map(|param| match param {
            Param::Type(name) | Param::ArrayType(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub(crate) fn member_param(&self) -> Option<&MemberRef> {
        self.params.iter().find_map(|param| match param {
            Param::Member(member) => Some(member),
            _ => None,
        })
    }
}

/// Instruction operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Param {
    /// Immediate value, local variable index, or absolute branch target.
    Numeric(i64),
    /// Class or array type from the constant pool.
    Type(String),
    /// Primitive element type of a `newarray`.
    ArrayType(String),
    /// Field or method reference.
    Member(MemberRef),
    /// Literal constant text.
    Constant(String),
}

/// Field, method or call site reference resolved from the constant pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MemberRef {
    pub(crate) owner: Option<String>,
    pub(crate) name: String,
    pub(crate) descriptor: String,
}

impl MemberRef {
    /// `owner.namedescriptor`, or `name descriptor` for dynamic call sites without an owner.
    pub(crate) fn signature(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{owner}.{}{}", self.name, self.descriptor),
            None => format!("{} {}", self.name, self.descriptor),
        }
    }
}
