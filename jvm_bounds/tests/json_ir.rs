//! Pre-lowered JSON IR as analysis input.

mod common;

use jvm_bounds::analysis::{analyze, AnalysisConfig};
use jvm_bounds::ir::ClassIr;
use jvm_bounds::loader::Repository;

const SEARCH: &str = r#"[
  {
    "name": "demo/Search",
    "super_name": "java/lang/Object",
    "source_file": "Search.java",
    "methods": [
      {
        "name": "last",
        "descriptor": "([I)I",
        "access_flags": 9,
        "instructions": [
          {"load": {"kind": "reference", "slot": 0}},
          {"load": {"kind": "reference", "slot": 0}},
          "array_length",
          {"array_load": "int"},
          {"return": "int"}
        ],
        "lines": [{"index": 0, "line": 4}]
      },
      {
        "name": "clamp",
        "descriptor": "([II)I",
        "access_flags": 9,
        "instructions": [
          {"load": {"kind": "int", "slot": 1}},
          {"branch": {"cond": {"zero": "lt"}, "target": 10}},
          {"load": {"kind": "int", "slot": 1}},
          {"load": {"kind": "reference", "slot": 0}},
          "array_length",
          {"branch": {"cond": {"ints": "ge"}, "target": 10}},
          {"load": {"kind": "reference", "slot": 0}},
          {"load": {"kind": "int", "slot": 1}},
          {"array_load": "int"},
          {"return": "int"},
          {"const": {"int": 0}},
          {"return": "int"}
        ],
        "lines": [{"index": 0, "line": 8}, {"index": 6, "line": 9}, {"index": 10, "line": 10}]
      }
    ]
  }
]"#;

#[test]
fn test_text_report() {
    let mut repository = Repository::new();
    let names = repository.load_json_str(SEARCH).unwrap();
    let outcome = analyze(&repository, &names, &AnalysisConfig::default()).unwrap();
    insta::assert_snapshot!(outcome.to_string(), @"Search.java:4 in last");
}

#[test]
fn test_json_report() {
    let mut repository = Repository::new();
    let names = repository.load_json_str(SEARCH).unwrap();
    let outcome = analyze(&repository, &names, &AnalysisConfig::default()).unwrap();
    insta::assert_snapshot!(serde_json::to_string_pretty(&outcome.reports).unwrap(), @r#"
    [
      {
        "file": "Search.java",
        "method": "last",
        "line": 4
      }
    ]
    "#);
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("search.json");
    std::fs::write(&path, SEARCH).unwrap();

    let mut repository = Repository::new();
    assert_eq!(repository.load_path(&path).unwrap(), vec!["demo/Search".to_string()]);
    let class: &ClassIr = jvm_bounds::ClassRepository::lookup(&repository, "demo/Search").unwrap();
    assert_eq!(class.methods.len(), 2);
    assert_eq!(class.methods[1].line_at(7), Some(9));
}

#[test]
fn test_hand_built_ir_matches_json() {
    use common::*;
    use jvm_bounds::ir::Instruction;

    let built = class(
        "Search",
        vec![method(
            "last",
            "([I)I",
            vec![aload(0), aload(0), Instruction::ArrayLength, iaload(), ireturn()],
        )],
    );
    let parsed: Vec<ClassIr> = serde_json::from_str(SEARCH).unwrap();
    assert_eq!(parsed[0].methods[0].instructions, built.methods[0].instructions);
}

#[test]
fn test_malformed_json_is_rejected() {
    let err = Repository::new().load_json_str(r#"[{"methods": []}]"#).unwrap_err();
    assert!(err.to_string().contains("missing field `name`"), "{err}");
}

#[test]
fn test_unsorted_line_annotations_report_the_right_line() {
    let text = r#"[{
      "name": "demo/J",
      "source_file": "J.java",
      "methods": [{
        "name": "g",
        "descriptor": "([II)I",
        "access_flags": 9,
        "instructions": [
          {"load": {"kind": "reference", "slot": 0}},
          {"load": {"kind": "int", "slot": 1}},
          {"array_load": "int"},
          {"return": "int"}
        ],
        "lines": [{"index": 2, "line": 9}, {"index": 0, "line": 5}]
      }]
    }]"#;
    let mut repository = Repository::new();
    let names = repository.load_json_str(text).unwrap();
    let outcome = analyze(&repository, &names, &AnalysisConfig::default()).unwrap();
    assert_eq!(common::report_lines(&outcome), vec!["J.java:9 in g"]);
}
