//! Lowering from decoded class files to the analysis IR.
//!
//! Each method's bytecode is decoded in one pass, recording the byte offset
//! of every instruction. A second pass rewrites branch targets from byte
//! offsets to instruction indices and maps the `LineNumberTable` onto
//! instruction indices.

mod opcode;

use crate::error::LoweringError;
use crate::ir::{ClassIr, Instruction, LineAnnotation, MethodIr};
use jvm_bounds_classfile::{ClassFile, ConstantPool, LineNumberEntry, MethodInfo};
use log::trace;
use opcode::Decoder;
use std::collections::HashMap;

pub type LowerResult<T> = Result<T, LoweringError>;

/// Lowers every method of `class`.
///
/// # Example
///
/// ```
/// use jvm_bounds::lowering::lower_class;
/// use jvm_bounds_classfile::ClassFile;
/// # use jvm_bounds_classfile::testing::{ClassBuilder, MethodCode};
/// # let mut builder = ClassBuilder::new("demo/A");
/// # builder.source_file("A.java").method(
/// #     jvm_bounds_classfile::access::ACC_STATIC, "f", "()V",
/// #     Some(MethodCode { code: vec![0xb1], ..Default::default() }),
/// # );
/// # let bytes = builder.build();
///
/// let class = lower_class(&ClassFile::parse(&bytes)?)?;
/// assert_eq!(class.source_name(), "A.java");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn lower_class(class: &ClassFile) -> LowerResult<ClassIr> {
    let methods = class
        .methods
        .iter()
        .map(|method| lower_method(method, &class.constant_pool))
        .collect::<LowerResult<Vec<_>>>()?;
    Ok(ClassIr {
        name: class.this_class.clone(),
        super_name: class.super_class.clone(),
        source_file: class.source_file.clone(),
        methods,
    })
}

/// Lowers one method. Methods without a `Code` attribute get an empty body.
pub fn lower_method(method: &MethodInfo, pool: &ConstantPool) -> LowerResult<MethodIr> {
    let mut lowered = MethodIr::new(&method.name, &method.descriptor, method.access_flags);
    let Some(code) = &method.code else {
        return Ok(lowered);
    };

    let mut decoder = Decoder::new(&code.code, pool, &method.name);
    let mut offsets = Vec::new();
    let mut instructions = Vec::new();
    while !decoder.is_empty() {
        offsets.push(decoder.position());
        instructions.push(decoder.decode_next()?);
    }

    let index_of: HashMap<usize, usize> = offsets
        .iter()
        .enumerate()
        .map(|(index, &offset)| (offset, index))
        .collect();
    for (index, instruction) in instructions.iter_mut().enumerate() {
        remap_targets(instruction, |target| {
            index_of
                .get(&target)
                .copied()
                .ok_or(LoweringError::InvalidBranchTarget {
                    offset: offsets[index],
                    target: target as i64,
                })
        })?;
    }

    trace!("{}: lowered {} instructions", method.name, instructions.len());
    lowered.instructions = instructions;
    lowered.lines = line_annotations(&code.line_numbers, &offsets);
    Ok(lowered)
}

fn remap_targets(
    instruction: &mut Instruction,
    mut map: impl FnMut(usize) -> LowerResult<usize>,
) -> LowerResult<()> {
    match instruction {
        Instruction::Branch { target, .. } | Instruction::Goto { target } => {
            *target = map(*target)?;
        }
        Instruction::Switch { default, targets } => {
            *default = map(*default)?;
            for target in targets.iter_mut() {
                *target = map(*target)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Line table rows keyed by instruction index. A row starting inside an
/// instruction applies from the next instruction boundary.
fn line_annotations(rows: &[LineNumberEntry], offsets: &[usize]) -> Vec<LineAnnotation> {
    let mut lines: Vec<LineAnnotation> = rows
        .iter()
        .filter_map(|row| {
            let index = offsets.partition_point(|&o| o < usize::from(row.start_pc));
            (index < offsets.len()).then_some(LineAnnotation {
                index,
                line: u32::from(row.line_number),
            })
        })
        .collect();
    lines.sort();
    lines.dedup_by_key(|a| a.index);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArrayKind, Cmp, Condition, Constant, StackOp, ValueKind};
    use jvm_bounds_classfile::access::{ACC_NATIVE, ACC_PUBLIC, ACC_STATIC};
    use jvm_bounds_classfile::testing::{ClassBuilder, MethodCode};
    use jvm_bounds_classfile::FieldType;
    use pretty_assertions::assert_eq;

    fn lower_code(builder: &mut ClassBuilder, code: Vec<u8>, lines: Vec<(u16, u16)>) -> LowerResult<MethodIr> {
        builder.method(
            ACC_PUBLIC | ACC_STATIC,
            "m",
            "([I)V",
            Some(MethodCode {
                max_stack: 4,
                max_locals: 4,
                code,
                line_numbers: lines,
            }),
        );
        let class = ClassFile::parse(&builder.build()).unwrap();
        let lowered = lower_class(&class)?;
        Ok(lowered.methods.into_iter().next().unwrap())
    }

    #[test]
    fn test_counted_loop() {
        // for (int i = 0; i < a.length; i++) a[i] = 0;
        let code = vec![
            0x03, // 0: iconst_0
            0x3c, // 1: istore_1
            0x1b, // 2: iload_1
            0x2a, // 3: aload_0
            0xbe, // 4: arraylength
            0xa2, 0x00, 0x0d, // 5: if_icmpge +13 -> 18
            0x2a, // 8: aload_0
            0x1b, // 9: iload_1
            0x03, // 10: iconst_0
            0x4f, // 11: iastore
            0x84, 0x01, 0x01, // 12: iinc 1 1
            0xa7, 0xff, 0xf3, // 15: goto -13 -> 2
            0xb1, // 18: return
        ];
        let method = lower_code(&mut ClassBuilder::new("demo/L"), code, vec![(0, 3), (8, 4), (18, 5)]).unwrap();
        assert_eq!(
            method.instructions,
            vec![
                Instruction::Const(Constant::Int(0)),
                Instruction::Store { kind: ValueKind::Int, slot: 1 },
                Instruction::Load { kind: ValueKind::Int, slot: 1 },
                Instruction::Load { kind: ValueKind::Reference, slot: 0 },
                Instruction::ArrayLength,
                Instruction::Branch { cond: Condition::Ints(Cmp::Ge), target: 12 },
                Instruction::Load { kind: ValueKind::Reference, slot: 0 },
                Instruction::Load { kind: ValueKind::Int, slot: 1 },
                Instruction::Const(Constant::Int(0)),
                Instruction::ArrayStore(ArrayKind::Int),
                Instruction::Iinc { slot: 1, delta: 1 },
                Instruction::Goto { target: 2 },
                Instruction::Return(None),
            ]
        );
        assert_eq!(method.line_at(9), Some(4));
        assert_eq!(method.line_at(12), Some(5));
    }

    #[test]
    fn test_constants_and_pool_entries() {
        let mut builder = ClassBuilder::new("demo/C");
        let big = builder.integer(100_000);
        let text = builder.string("hi");
        let field = builder.field_ref("demo/C", "count", "I");
        let code = vec![
            0x02, // iconst_m1
            0x10, 0xf6, // bipush -10
            0x11, 0x01, 0x00, // sipush 256
            0x12, big as u8, // ldc
            0x13, (text >> 8) as u8, text as u8, // ldc_w
            0xb2, (field >> 8) as u8, field as u8, // getstatic
            0xb1,
        ];
        let method = lower_code(&mut builder, code, vec![]).unwrap();
        assert_eq!(
            method.instructions,
            vec![
                Instruction::Const(Constant::Int(-1)),
                Instruction::Const(Constant::Int(-10)),
                Instruction::Const(Constant::Int(256)),
                Instruction::Const(Constant::Int(100_000)),
                Instruction::Const(Constant::String("hi".to_string())),
                Instruction::GetField { is_static: true, descriptor: "I".to_string() },
                Instruction::Return(None),
            ]
        );
    }

    #[test]
    fn test_tableswitch_padding_and_targets() {
        let code = vec![
            0x1a, // 0: iload_0
            0xaa, // 1: tableswitch
            0x00, 0x00, // 2..3: padding to 4
            0x00, 0x00, 0x00, 0x17, // default +23 -> 24
            0x00, 0x00, 0x00, 0x00, // low 0
            0x00, 0x00, 0x00, 0x01, // high 1
            0x00, 0x00, 0x00, 0x17, // 0 -> 24
            0x00, 0x00, 0x00, 0x18, // 1 -> 25
            0x00, // 24: nop
            0xb1, // 25: return
        ];
        let method = lower_code(&mut ClassBuilder::new("demo/S"), code, vec![]).unwrap();
        assert_eq!(
            method.instructions[1],
            Instruction::Switch { default: 2, targets: vec![2, 3] }
        );
    }

    #[test]
    fn test_wide_and_stack_ops() {
        let code = vec![
            0xc4, 0x15, 0x01, 0x00, // wide iload 256
            0xc4, 0x84, 0x01, 0x00, 0xff, 0x00, // wide iinc 256 -256
            0x59, // dup
            0x5f, // swap
            0xbc, 0x0a, // newarray int
            0xb1,
        ];
        let method = lower_code(&mut ClassBuilder::new("demo/W"), code, vec![]).unwrap();
        assert_eq!(
            method.instructions,
            vec![
                Instruction::Load { kind: ValueKind::Int, slot: 256 },
                Instruction::Iinc { slot: 256, delta: -256 },
                Instruction::Stack(StackOp::Dup),
                Instruction::Stack(StackOp::Swap),
                Instruction::NewArray { element: FieldType::Int },
                Instruction::Return(None),
            ]
        );
    }

    #[test]
    fn test_jsr_is_kept_as_unsupported() {
        let code = vec![0xa8, 0x00, 0x03, 0xb1];
        let method = lower_code(&mut ClassBuilder::new("demo/J"), code, vec![]).unwrap();
        assert_eq!(method.instructions[0], Instruction::Unsupported { opcode: 0xa8 });
    }

    #[test]
    fn test_branch_into_middle_of_instruction() {
        let code = vec![0x10, 0x05, 0xa7, 0xff, 0xff, 0xb1]; // goto -1
        let err = lower_code(&mut ClassBuilder::new("demo/B"), code, vec![]).unwrap_err();
        assert_eq!(err, LoweringError::InvalidBranchTarget { offset: 2, target: 1 });
    }

    #[test]
    fn test_branch_before_code_start() {
        let code = vec![0xa7, 0xff, 0xf0];
        let err = lower_code(&mut ClassBuilder::new("demo/B"), code, vec![]).unwrap_err();
        assert_eq!(err, LoweringError::InvalidBranchTarget { offset: 0, target: -16 });
    }

    #[test]
    fn test_truncated_and_unknown() {
        let err = lower_code(&mut ClassBuilder::new("demo/T"), vec![0x11, 0x01], vec![]).unwrap_err();
        assert_eq!(err, LoweringError::Truncated { offset: 0 });

        let err = lower_code(&mut ClassBuilder::new("demo/U"), vec![0x00, 0xcb], vec![]).unwrap_err();
        assert_eq!(err, LoweringError::UnknownOpcode { opcode: 0xcb, offset: 1 });

        let err = lower_code(&mut ClassBuilder::new("demo/N"), vec![0x03, 0xbc, 0x02], vec![]).unwrap_err();
        assert_eq!(err, LoweringError::InvalidArrayType { offset: 1, code: 2 });
    }

    #[test]
    fn test_native_method_has_no_body() {
        let mut builder = ClassBuilder::new("demo/N");
        builder.method(ACC_PUBLIC | ACC_NATIVE, "n", "()I", None);
        let class = lower_class(&ClassFile::parse(&builder.build()).unwrap()).unwrap();
        assert!(class.methods[0].instructions.is_empty());
        assert!(class.methods[0].is_native());
    }

    #[test]
    fn test_line_rows_inside_instruction_snap_forward() {
        let rows = [LineNumberEntry { start_pc: 1, line_number: 7 }];
        let lines = line_annotations(&rows, &[0, 3, 4]);
        assert_eq!(lines, vec![LineAnnotation { index: 1, line: 7 }]);
    }
}
