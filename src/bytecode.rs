use anyhow::{Context, Result};
use jclassfile::constant_pool::ConstantPool;

use crate::ir::{Instruction, MemberRef, Param};
use crate::opcodes::Opcode;

/// Decode a method's `Code` bytes into instructions, resolving constant pool
/// operands and turning relative branch offsets into absolute targets.
pub(crate) fn decode_code(code: &[u8], constant_pool: &[ConstantPool]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let length = opcode_length(code, offset)?;
        if length == 0 || offset + length > code.len() {
            anyhow::bail!("invalid bytecode length at offset {}", offset);
        }
        let inst = decode_instruction(code, offset, constant_pool)
            .with_context(|| format!("decode instruction at offset {offset}"))?;
        instructions.push(inst);
        offset += length;
    }
    Ok(instructions)
}

fn decode_instruction(
    code: &[u8],
    offset: usize,
    constant_pool: &[ConstantPool],
) -> Result<Instruction> {
    let byte = code[offset];
    let opcode =
        Opcode::from_byte(byte).with_context(|| format!("unsupported opcode 0x{byte:02x}"))?;
    let inst = Instruction::new(opcode, offset as u32);
    let at = offset as i64;

    let inst = match opcode {
        Opcode::BIPUSH => inst.with_param(Param::Numeric(read_u8(code, offset + 1)? as i8 as i64)),
        Opcode::SIPUSH => inst.with_param(Param::Numeric(read_i16(code, offset + 1)? as i64)),
        Opcode::LDC => {
            let index = read_u8(code, offset + 1)? as u16;
            with_loadable_constant(inst, constant_pool, index)?
        }
        Opcode::LDC_W | Opcode::LDC2_W => {
            let index = read_u16(code, offset + 1)?;
            with_loadable_constant(inst, constant_pool, index)?
        }
        Opcode::ILOAD
        | Opcode::LLOAD
        | Opcode::FLOAD
        | Opcode::DLOAD
        | Opcode::ALOAD
        | Opcode::ISTORE
        | Opcode::LSTORE
        | Opcode::FSTORE
        | Opcode::DSTORE
        | Opcode::ASTORE
        | Opcode::RET => inst.with_param(Param::Numeric(read_u8(code, offset + 1)? as i64)),
        Opcode::IINC => inst
            .with_param(Param::Numeric(read_u8(code, offset + 1)? as i64))
            .with_param(Param::Numeric(read_u8(code, offset + 2)? as i8 as i64)),
        Opcode::GOTO | Opcode::JSR => {
            inst.with_param(Param::Numeric(at + read_i16(code, offset + 1)? as i64))
        }
        op if op.is_conditional_branch() => {
            inst.with_param(Param::Numeric(at + read_i16(code, offset + 1)? as i64))
        }
        Opcode::GOTO_W | Opcode::JSR_W => {
            inst.with_param(Param::Numeric(at + read_i32(code, offset + 1)? as i64))
        }
        Opcode::TABLESWITCH => switch_targets(code, offset)?
            .into_iter()
            .fold(inst, |inst, target| inst.with_param(Param::Numeric(target))),
        Opcode::LOOKUPSWITCH => lookupswitch_targets(code, offset)?
            .into_iter()
            .fold(inst, |inst, target| inst.with_param(Param::Numeric(target))),
        Opcode::GETSTATIC | Opcode::PUTSTATIC | Opcode::GETFIELD | Opcode::PUTFIELD => {
            let member = resolve_member_ref(constant_pool, read_u16(code, offset + 1)?)
                .context("resolve field ref")?;
            let comment = format!("Field {}", javap_member(&member));
            inst.with_param(Param::Member(member)).with_comment(comment)
        }
        Opcode::INVOKEVIRTUAL
        | Opcode::INVOKESPECIAL
        | Opcode::INVOKESTATIC
        | Opcode::INVOKEINTERFACE => {
            let member = resolve_member_ref(constant_pool, read_u16(code, offset + 1)?)
                .context("resolve method ref")?;
            let comment = format!("Method {}", javap_member(&member));
            inst.with_param(Param::Member(member)).with_comment(comment)
        }
        Opcode::INVOKEDYNAMIC => {
            let member = resolve_dynamic_call(constant_pool, read_u16(code, offset + 1)?)
                .context("resolve invokedynamic")?;
            let comment = format!("InvokeDynamic {}:{}", member.name, member.descriptor);
            inst.with_param(Param::Member(member)).with_comment(comment)
        }
        Opcode::NEW | Opcode::ANEWARRAY | Opcode::CHECKCAST | Opcode::INSTANCEOF => {
            let name = resolve_class_name(constant_pool, read_u16(code, offset + 1)?)
                .context("resolve class operand")?;
            let comment = format!("class {name}");
            inst.with_param(Param::Type(name)).with_comment(comment)
        }
        Opcode::MULTIANEWARRAY => {
            let name = resolve_class_name(constant_pool, read_u16(code, offset + 1)?)
                .context("resolve array class")?;
            let dimensions = read_u8(code, offset + 3)? as i64;
            let comment = format!("class \"{name}\"");
            inst.with_param(Param::Type(name))
                .with_param(Param::Numeric(dimensions))
                .with_comment(comment)
        }
        Opcode::NEWARRAY => {
            let atype = read_u8(code, offset + 1)?;
            inst.with_param(Param::ArrayType(primitive_array_type(atype)?.to_string()))
        }
        Opcode::WIDE => decode_wide(code, offset)?,
        _ => inst,
    };
    Ok(inst)
}

/// `wide` is folded into the instruction it widens, keeping the `wide` offset.
fn decode_wide(code: &[u8], offset: usize) -> Result<Instruction> {
    let byte = read_u8(code, offset + 1)?;
    let opcode =
        Opcode::from_byte(byte).with_context(|| format!("unsupported wide opcode 0x{byte:02x}"))?;
    let index = read_u16(code, offset + 2)? as i64;
    let inst = Instruction::new(opcode, offset as u32)
        .with_param(Param::Numeric(index))
        .with_comment("wide");
    if opcode == Opcode::IINC {
        return Ok(inst.with_param(Param::Numeric(read_i16(code, offset + 4)? as i64)));
    }
    Ok(inst)
}

fn with_loadable_constant(
    inst: Instruction,
    constant_pool: &[ConstantPool],
    index: u16,
) -> Result<Instruction> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing constant pool entry")?;
    let inst = match entry {
        ConstantPool::String { string_index } => {
            let value = resolve_utf8(constant_pool, *string_index)?;
            let comment = format!("String {value}");
            inst.with_param(Param::Constant(value)).with_comment(comment)
        }
        ConstantPool::Class { name_index } => {
            let name = resolve_utf8(constant_pool, *name_index)?;
            let comment = format!("class {name}");
            inst.with_param(Param::Type(name)).with_comment(comment)
        }
        _ => inst.with_param(Param::Constant(format!("#{index}"))),
    };
    Ok(inst)
}

fn javap_member(member: &MemberRef) -> String {
    match &member.owner {
        Some(owner) => format!("{owner}.{}:{}", member.name, member.descriptor),
        None => format!("{}:{}", member.name, member.descriptor),
    }
}

fn primitive_array_type(atype: u8) -> Result<&'static str> {
    let name = match atype {
        4 => "boolean",
        5 => "char",
        6 => "float",
        7 => "double",
        8 => "byte",
        9 => "short",
        10 => "int",
        11 => "long",
        _ => anyhow::bail!("invalid newarray type {}", atype),
    };
    Ok(name)
}

pub(crate) fn resolve_class_name(
    constant_pool: &[ConstantPool],
    class_index: u16,
) -> Result<String> {
    let entry = constant_pool
        .get(class_index as usize)
        .context("missing class entry")?;
    match entry {
        ConstantPool::Class { name_index } => resolve_utf8(constant_pool, *name_index),
        _ => anyhow::bail!("unexpected class entry"),
    }
}

pub(crate) fn resolve_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<String> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing utf8 entry")?;
    match entry {
        ConstantPool::Utf8 { value } => Ok(value.clone()),
        _ => anyhow::bail!("unexpected utf8 entry"),
    }
}

fn resolve_member_ref(constant_pool: &[ConstantPool], index: u16) -> Result<MemberRef> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing member ref entry")?;
    let (class_index, name_and_type_index) = match entry {
        ConstantPool::Fieldref {
            class_index,
            name_and_type_index,
        }
        | ConstantPool::Methodref {
            class_index,
            name_and_type_index,
        }
        | ConstantPool::InterfaceMethodref {
            class_index,
            name_and_type_index,
        } => (*class_index, *name_and_type_index),
        _ => anyhow::bail!("unexpected member ref entry"),
    };
    let owner = resolve_class_name(constant_pool, class_index).context("resolve owner")?;
    let (name, descriptor) = resolve_name_and_type(constant_pool, name_and_type_index)?;
    Ok(MemberRef {
        owner: Some(owner),
        name,
        descriptor,
    })
}

fn resolve_dynamic_call(constant_pool: &[ConstantPool], index: u16) -> Result<MemberRef> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing invokedynamic entry")?;
    let name_and_type_index = match entry {
        ConstantPool::InvokeDynamic {
            name_and_type_index,
            ..
        } => *name_and_type_index,
        _ => anyhow::bail!("unexpected invokedynamic entry"),
    };
    let (name, descriptor) = resolve_name_and_type(constant_pool, name_and_type_index)?;
    Ok(MemberRef {
        owner: None,
        name,
        descriptor,
    })
}

fn resolve_name_and_type(constant_pool: &[ConstantPool], index: u16) -> Result<(String, String)> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing name and type entry")?;
    match entry {
        ConstantPool::NameAndType {
            name_index,
            descriptor_index,
        } => Ok((
            resolve_utf8(constant_pool, *name_index).context("resolve member name")?,
            resolve_utf8(constant_pool, *descriptor_index).context("resolve member descriptor")?,
        )),
        _ => anyhow::bail!("unexpected name and type entry"),
    }
}

pub(crate) fn opcode_length(code: &[u8], offset: usize) -> Result<usize> {
    let byte = code[offset];
    let length = match byte {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        0x12 => 2,
        0x13 | 0x14 => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        0x84 => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        0xaa => tableswitch_length(code, offset)?,
        0xab => lookupswitch_length(code, offset)?,
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        0xb9 | 0xba => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        0xc4 => wide_length(code, offset)?,
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        0xca => 1,
        0xfe | 0xff => 1,
        _ => anyhow::bail!("unsupported opcode 0x{:02x}", byte),
    };
    Ok(length)
}

fn tableswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let count = tableswitch_count(code, base)?;
    Ok(1 + padding + 12 + count * 4)
}

fn tableswitch_count(code: &[u8], base: usize) -> Result<usize> {
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|v| v.checked_add(1))
        .context("invalid tableswitch range")?;
    if count < 0 {
        anyhow::bail!("invalid tableswitch range");
    }
    Ok(count as usize)
}

fn lookupswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let npairs = read_i32(code, base + 4)?;
    if npairs < 0 {
        anyhow::bail!("invalid lookupswitch pairs");
    }
    Ok(1 + padding + 8 + (npairs as usize) * 8)
}

fn wide_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code
        .get(offset + 1)
        .copied()
        .context("missing wide opcode")?;
    if opcode == 0x84 { Ok(6) } else { Ok(4) }
}

/// Default target followed by every jump table target, all absolute.
fn switch_targets(code: &[u8], offset: usize) -> Result<Vec<i64>> {
    let base = offset + 1 + padding(offset);
    let at = offset as i64;
    let mut targets = vec![at + read_i32(code, base)? as i64];
    let count = tableswitch_count(code, base)?;
    let mut idx = base + 12;
    for _ in 0..count {
        targets.push(at + read_i32(code, idx)? as i64);
        idx += 4;
    }
    Ok(targets)
}

/// Default target followed by the target of every match pair, all absolute.
fn lookupswitch_targets(code: &[u8], offset: usize) -> Result<Vec<i64>> {
    let base = offset + 1 + padding(offset);
    let at = offset as i64;
    let mut targets = vec![at + read_i32(code, base)? as i64];
    let npairs = read_i32(code, base + 4)?;
    let mut idx = base + 8;
    for _ in 0..npairs {
        targets.push(at + read_i32(code, idx + 4)? as i64);
        idx += 8;
    }
    Ok(targets)
}

fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn read_u8(code: &[u8], offset: usize) -> Result<u8> {
    code.get(offset).copied().context("bytecode u8 out of bounds")
}

fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let slice = code
        .get(offset..offset + 2)
        .context("bytecode u16 out of bounds")?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_i16(code: &[u8], offset: usize) -> Result<i16> {
    let value = read_u16(code, offset)?;
    Ok(i16::from_be_bytes(value.to_be_bytes()))
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    let slice = code
        .get(offset..offset + 4)
        .context("bytecode u32 out of bounds")?;
    Ok(i32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<ConstantPool> {
        vec![
            ConstantPool::Utf8 {
                value: String::new(),
            },
            ConstantPool::Utf8 {
                value: "java/lang/StringBuilder".to_string(),
            },
            ConstantPool::Class { name_index: 1 },
            ConstantPool::Utf8 {
                value: "<init>".to_string(),
            },
            ConstantPool::Utf8 {
                value: "()V".to_string(),
            },
            ConstantPool::NameAndType {
                name_index: 3,
                descriptor_index: 4,
            },
            ConstantPool::Methodref {
                class_index: 2,
                name_and_type_index: 5,
            },
            ConstantPool::Utf8 {
                value: "hello".to_string(),
            },
            ConstantPool::String { string_index: 7 },
        ]
    }

    fn opcodes(instructions: &[Instruction]) -> Vec<Opcode> {
        instructions.iter().map(|inst| inst.opcode).collect()
    }

    #[test]
    fn decodes_offsets_and_constant_pool_operands() {
        // new #2; dup; invokespecial #6; areturn
        let code = [0xbb, 0x00, 0x02, 0x59, 0xb7, 0x00, 0x06, 0xb0];

        let instructions = decode_code(&code, &pool()).expect("decode");

        assert_eq!(
            vec![Opcode::NEW, Opcode::DUP, Opcode::INVOKESPECIAL, Opcode::ARETURN],
            opcodes(&instructions)
        );
        assert_eq!(
            vec![0, 3, 4, 7],
            instructions.iter().map(|inst| inst.offset).collect::<Vec<_>>()
        );
        assert_eq!(Some("java/lang/StringBuilder"), instructions[0].type_param());
        assert_eq!(
            "java/lang/StringBuilder.<init>()V",
            instructions[2].member_param().expect("member").signature()
        );
        assert_eq!(
            Some("Method java/lang/StringBuilder.<init>:()V"),
            instructions[2].comment.as_deref()
        );
    }

    #[test]
    fn branch_offsets_become_absolute_targets() {
        // iconst_0; ifeq +7; iconst_1; goto -4; ireturn
        let code = [0x03, 0x99, 0x00, 0x07, 0x04, 0xa7, 0xff, 0xfc, 0xac];

        let instructions = decode_code(&code, &pool()).expect("decode");

        assert_eq!(Some(8), instructions[1].numeric_param());
        assert_eq!(Some(1), instructions[3].numeric_param());
    }

    #[test]
    fn tableswitch_targets_include_default() {
        // iload_1 at 0, tableswitch at 1 (2 padding bytes), low 0 high 1
        let mut code = vec![0x1b, 0xaa, 0x00, 0x00];
        code.extend_from_slice(&27i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&23i32.to_be_bytes());
        code.extend_from_slice(&25i32.to_be_bytes());
        code.extend_from_slice(&[0x04, 0xac, 0x05, 0xac, 0x03, 0xac]);

        let instructions = decode_code(&code, &pool()).expect("decode");

        assert_eq!(Opcode::TABLESWITCH, instructions[1].opcode);
        assert_eq!(
            vec![Param::Numeric(28), Param::Numeric(24), Param::Numeric(26)],
            instructions[1].params
        );
        assert_eq!(24, instructions[2].offset);
    }

    #[test]
    fn ldc_resolves_string_literals() {
        let code = [0x12, 0x08, 0xb0];

        let instructions = decode_code(&code, &pool()).expect("decode");

        assert_eq!(
            vec![Param::Constant("hello".to_string())],
            instructions[0].params
        );
        assert_eq!(Some("String hello"), instructions[0].comment.as_deref());
    }

    #[test]
    fn wide_is_folded_into_the_widened_instruction() {
        // wide iinc 300 by -1; return
        let code = [0xc4, 0x84, 0x01, 0x2c, 0xff, 0xff, 0xb1];

        let instructions = decode_code(&code, &pool()).expect("decode");

        assert_eq!(vec![Opcode::IINC, Opcode::RETURN], opcodes(&instructions));
        assert_eq!(
            vec![Param::Numeric(300), Param::Numeric(-1)],
            instructions[0].params
        );
        assert_eq!(6, instructions[1].offset);
    }

    #[test]
    fn newarray_names_the_primitive_type() {
        let code = [0x10, 0x04, 0xbc, 0x0a, 0xb0];

        let instructions = decode_code(&code, &pool()).expect("decode");

        assert_eq!(Some(4), instructions[0].numeric_param());
        assert_eq!(Some("int"), instructions[1].type_param());
    }

    #[test]
    fn truncated_code_is_rejected() {
        assert!(decode_code(&[0xb7, 0x00], &pool()).is_err());
        assert!(decode_code(&[0xcb], &pool()).is_err());
    }
}
