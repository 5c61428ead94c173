//! Bytecode walking. Only the instructions that carry something searchable
//! (constants, member references, type references) are decoded; everything
//! else is skipped by length.

use super::constpool::{ConstantPool, Literal, MemberRef};
use super::cursor::ByteCursor;
use crate::error::ClassFormatError;

pub const ICONST_M1: u8 = 0x02;
pub const ICONST_5: u8 = 0x08;
pub const LCONST_0: u8 = 0x09;
pub const LCONST_1: u8 = 0x0A;
pub const FCONST_0: u8 = 0x0B;
pub const FCONST_2: u8 = 0x0D;
pub const DCONST_0: u8 = 0x0E;
pub const DCONST_1: u8 = 0x0F;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const IINC: u8 = 0x84;
pub const TABLESWITCH: u8 = 0xAA;
pub const LOOKUPSWITCH: u8 = 0xAB;
pub const GETSTATIC: u8 = 0xB2;
pub const PUTSTATIC: u8 = 0xB3;
pub const GETFIELD: u8 = 0xB4;
pub const PUTFIELD: u8 = 0xB5;
pub const INVOKEVIRTUAL: u8 = 0xB6;
pub const INVOKESPECIAL: u8 = 0xB7;
pub const INVOKESTATIC: u8 = 0xB8;
pub const INVOKEINTERFACE: u8 = 0xB9;
pub const INVOKEDYNAMIC: u8 = 0xBA;
pub const NEW: u8 = 0xBB;
pub const ANEWARRAY: u8 = 0xBD;
pub const CHECKCAST: u8 = 0xC0;
pub const INSTANCEOF: u8 = 0xC1;
pub const WIDE: u8 = 0xC4;
pub const MULTIANEWARRAY: u8 = 0xC5;
pub const RETURN: u8 = 0xB1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction<'a> {
    /// Field access or method invocation.
    Member { opcode: u8, reference: MemberRef<'a> },
    /// `new`, `anewarray`, `checkcast`, `instanceof`, `multianewarray`.
    Type { opcode: u8, type_name: &'a str },
    /// Any constant push, including the `xconst_n` shorthands.
    Constant { opcode: u8, value: Literal<'a> },
    /// `invokedynamic` call site name and descriptor.
    Dynamic { name: &'a str, descriptor: &'a str },
}

/// Walks `code`, returning each searchable instruction with its byte offset.
pub fn decode<'p>(
    code: &[u8],
    pool: &'p ConstantPool,
) -> Result<Vec<(usize, Instruction<'p>)>, ClassFormatError> {
    let mut out = Vec::new();
    let mut cursor = ByteCursor::new(code);

    while cursor.remaining() > 0 {
        let offset = cursor.position();
        let opcode = cursor.u1()?;
        let insn = match opcode {
            ICONST_M1..=ICONST_5 => Some(Instruction::Constant {
                opcode,
                value: Literal::Int(i32::from(opcode) - i32::from(ICONST_M1) - 1),
            }),
            LCONST_0 | LCONST_1 => Some(Instruction::Constant {
                opcode,
                value: Literal::Long(i64::from(opcode - LCONST_0)),
            }),
            FCONST_0..=FCONST_2 => Some(Instruction::Constant {
                opcode,
                value: Literal::Float(f32::from(opcode - FCONST_0)),
            }),
            DCONST_0 | DCONST_1 => Some(Instruction::Constant {
                opcode,
                value: Literal::Double(f64::from(opcode - DCONST_0)),
            }),
            BIPUSH => Some(Instruction::Constant {
                opcode,
                value: Literal::Int(i32::from(cursor.i1()?)),
            }),
            SIPUSH => Some(Instruction::Constant {
                opcode,
                value: Literal::Int(i32::from(cursor.i2()?)),
            }),
            LDC => {
                let index = u16::from(cursor.u1()?);
                Some(Instruction::Constant {
                    opcode,
                    value: pool.literal(index)?,
                })
            }
            LDC_W | LDC2_W => {
                let index = cursor.u2()?;
                Some(Instruction::Constant {
                    opcode,
                    value: pool.literal(index)?,
                })
            }
            GETSTATIC..=INVOKESTATIC => Some(Instruction::Member {
                opcode,
                reference: pool.member_ref(cursor.u2()?)?,
            }),
            INVOKEINTERFACE => {
                let reference = pool.member_ref(cursor.u2()?)?;
                cursor.skip(2)?;
                Some(Instruction::Member { opcode, reference })
            }
            INVOKEDYNAMIC => {
                let (name, descriptor) = pool.invoke_dynamic(cursor.u2()?)?;
                cursor.skip(2)?;
                Some(Instruction::Dynamic { name, descriptor })
            }
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Some(Instruction::Type {
                opcode,
                type_name: pool.class_name(cursor.u2()?)?,
            }),
            MULTIANEWARRAY => {
                let type_name = pool.class_name(cursor.u2()?)?;
                cursor.skip(1)?;
                Some(Instruction::Type { opcode, type_name })
            }
            TABLESWITCH => {
                skip_padding(&mut cursor)?;
                cursor.skip(4)?;
                let low = cursor.i4()?;
                let high = cursor.i4()?;
                let entries = i64::from(high) - i64::from(low) + 1;
                if entries < 0 {
                    return Err(ClassFormatError::InvalidOpcode { opcode, offset });
                }
                cursor.skip(jump_table_len(entries, 4, opcode, offset)?)?;
                None
            }
            LOOKUPSWITCH => {
                skip_padding(&mut cursor)?;
                cursor.skip(4)?;
                let pairs = cursor.i4()?;
                if pairs < 0 {
                    return Err(ClassFormatError::InvalidOpcode { opcode, offset });
                }
                cursor.skip(jump_table_len(i64::from(pairs), 8, opcode, offset)?)?;
                None
            }
            WIDE => {
                let inner = cursor.u1()?;
                cursor.skip(if inner == IINC { 4 } else { 2 })?;
                None
            }
            other => {
                let len = operand_len(other).ok_or(ClassFormatError::InvalidOpcode {
                    opcode: other,
                    offset,
                })?;
                cursor.skip(len)?;
                None
            }
        };
        if let Some(insn) = insn {
            out.push((offset, insn));
        }
    }

    Ok(out)
}

fn skip_padding(cursor: &mut ByteCursor<'_>) -> Result<(), ClassFormatError> {
    let pad = (4 - cursor.position() % 4) % 4;
    cursor.skip(pad)
}

fn jump_table_len(
    entries: i64,
    width: i64,
    opcode: u8,
    offset: usize,
) -> Result<usize, ClassFormatError> {
    usize::try_from(entries * width).map_err(|_| ClassFormatError::InvalidOpcode { opcode, offset })
}

/// Operand byte count for fixed-length opcodes not decoded above.
fn operand_len(opcode: u8) -> Option<usize> {
    Some(match opcode {
        0x00..=0x0F => 0,
        0x15..=0x19 => 1,
        0x1A..=0x35 => 0,
        0x36..=0x3A => 1,
        0x3B..=0x83 => 0,
        IINC => 2,
        0x85..=0x98 => 0,
        0x99..=0xA8 => 2,
        0xA9 => 1,
        0xAC..=0xB1 => 0,
        0xBC => 1,
        0xBE | 0xBF => 0,
        0xC2 | 0xC3 => 0,
        0xC6 | 0xC7 => 2,
        0xC8 | 0xC9 => 4,
        0xCA | 0xFE | 0xFF => 0,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_pool() -> ConstantPool {
        let bytes = [0x00, 0x01];
        ConstantPool::parse(&mut ByteCursor::new(&bytes)).unwrap()
    }

    #[test]
    fn decodes_constant_pushes() {
        let pool = empty_pool();
        let code = [ICONST_M1, 0x06, BIPUSH, 0xF6, SIPUSH, 0x01, 0x00, DCONST_1, RETURN];
        let insns = decode(&code, &pool).unwrap();
        let values: Vec<_> = insns
            .iter()
            .map(|(_, i)| match i {
                Instruction::Constant { value, .. } => *value,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            values,
            vec![
                Literal::Int(-1),
                Literal::Int(3),
                Literal::Int(-10),
                Literal::Int(256),
                Literal::Double(1.0)
            ]
        );
        assert_eq!(insns[2].0, 2);
        assert_eq!(insns[3].0, 4);
    }

    #[test]
    fn skips_switch_tables_with_alignment() {
        let pool = empty_pool();
        // offset 0: iconst_0, offset 1: tableswitch, pad to 4, default, low=0, high=1, 2 jumps
        let mut code = vec![0x03, TABLESWITCH, 0, 0];
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&[0; 8]);
        code.push(BIPUSH);
        code.push(7);
        let insns = decode(&code, &pool).unwrap();
        assert_eq!(insns.len(), 2);
        assert_eq!(
            insns[1].1,
            Instruction::Constant {
                opcode: BIPUSH,
                value: Literal::Int(7)
            }
        );
    }

    #[test]
    fn wide_iinc_is_skipped() {
        let pool = empty_pool();
        let code = [WIDE, IINC, 0x00, 0x01, 0x00, 0x05, 0x04];
        let insns = decode(&code, &pool).unwrap();
        assert_eq!(insns.len(), 1);
        assert_eq!(insns[0].0, 6);
    }

    #[test]
    fn invalid_opcode_is_reported_with_offset() {
        let pool = empty_pool();
        let code = [0x00, 0xEE];
        let err = decode(&code, &pool).unwrap_err();
        assert_eq!(
            err,
            ClassFormatError::InvalidOpcode {
                opcode: 0xEE,
                offset: 1
            }
        );
    }

    #[test]
    fn truncated_operand_is_reported() {
        let pool = empty_pool();
        let code = [SIPUSH, 0x01];
        assert!(matches!(
            decode(&code, &pool),
            Err(ClassFormatError::Truncated { .. })
        ));
    }
}
