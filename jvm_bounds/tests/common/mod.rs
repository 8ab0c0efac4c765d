//! Shared helpers for integration tests
// Each test target uses a different subset of these helpers.
#![allow(dead_code)]

use jvm_bounds::analysis::{analyze, AnalysisConfig, AnalysisOutcome};
use jvm_bounds::error::AnalysisError;
use jvm_bounds::ir::{
    ArrayKind, ClassIr, Cmp, Condition, Constant, Instruction, InvokeKind, LineAnnotation,
    MethodIr, ValueKind,
};
use jvm_bounds::loader::Repository;

pub fn iload(slot: u16) -> Instruction {
    Instruction::Load { kind: ValueKind::Int, slot }
}

pub fn aload(slot: u16) -> Instruction {
    Instruction::Load { kind: ValueKind::Reference, slot }
}

pub fn istore(slot: u16) -> Instruction {
    Instruction::Store { kind: ValueKind::Int, slot }
}

pub fn iconst(value: i32) -> Instruction {
    Instruction::Const(Constant::Int(value))
}

pub fn if_icmp(cmp: Cmp, target: usize) -> Instruction {
    Instruction::Branch { cond: Condition::Ints(cmp), target }
}

pub fn if_zero(cmp: Cmp, target: usize) -> Instruction {
    Instruction::Branch { cond: Condition::Zero(cmp), target }
}

pub fn goto(target: usize) -> Instruction {
    Instruction::Goto { target }
}

pub fn iastore() -> Instruction {
    Instruction::ArrayStore(ArrayKind::Int)
}

pub fn iaload() -> Instruction {
    Instruction::ArrayLoad(ArrayKind::Int)
}

pub fn invokestatic(owner: &str, name: &str, descriptor: &str) -> Instruction {
    Instruction::Invoke {
        kind: InvokeKind::Static,
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    }
}

pub fn ireturn() -> Instruction {
    Instruction::Return(Some(ValueKind::Int))
}

pub fn vreturn() -> Instruction {
    Instruction::Return(None)
}

/// A static method whose instruction `i` sits on source line `i + 1`.
pub fn method(name: &str, descriptor: &str, instructions: Vec<Instruction>) -> MethodIr {
    let lines = (0..instructions.len())
        .map(|index| LineAnnotation { index, line: index as u32 + 1 })
        .collect();
    MethodIr::new_static(name, descriptor)
        .with_instructions(instructions)
        .with_lines(lines)
}

/// `demo/<name>` compiled from `<name>.java`.
pub fn class(name: &str, methods: Vec<MethodIr>) -> ClassIr {
    methods.into_iter().fold(
        ClassIr::new(&format!("demo/{name}")).with_source_file(&format!("{name}.java")),
        ClassIr::with_method,
    )
}

pub fn repository(classes: Vec<ClassIr>) -> Repository {
    let mut repository = Repository::new();
    for class in classes {
        repository.add_class(class);
    }
    repository
}

/// Analyses every class in `classes` as one closed set.
pub fn run(classes: Vec<ClassIr>) -> Result<AnalysisOutcome, AnalysisError> {
    let names: Vec<String> = classes.iter().map(|c| c.name.clone()).collect();
    analyze(&repository(classes), &names, &AnalysisConfig::default())
}

pub fn report_lines(outcome: &AnalysisOutcome) -> Vec<String> {
    outcome.reports.iter().map(ToString::to_string).collect()
}

/// `for (int i = start; i < a.length; i++) a[i] = 0;` as javac lays it out.
pub fn fill_loop(start: i32) -> Vec<Instruction> {
    vec![
        iconst(start),
        istore(1),
        iload(1),
        aload(0),
        Instruction::ArrayLength,
        if_icmp(Cmp::Ge, 12),
        aload(0),
        iload(1),
        iconst(0),
        iastore(),
        Instruction::Iinc { slot: 1, delta: 1 },
        goto(2),
        vreturn(),
    ]
}
