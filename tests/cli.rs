use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use serde_json::{Value, json};

fn aventine(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_aventine"))
        .arg("--data-dir")
        .arg(data_dir)
        .arg("-q")
        .args(args)
        .env_remove("AVENTINE_LOG")
        .env_remove("AVENTINE_ANNOTATOR")
        .env_remove("AVENTINE_GLOSSARY")
        .env_remove("AVENTINE_SOURCE_VECTORS")
        .env_remove("AVENTINE_DIMENSION")
        .env_remove("AVENTINE_KEY_SCHEME")
        .output()
        .expect("run aventine")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "aventine failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).expect("utf-8 stdout")
}

fn write_source(root: &Path, key: &str, text: &str, index: &[&str]) -> PathBuf {
    let sources = root.join("sources");
    std::fs::create_dir_all(sources.join("metadata")).unwrap();
    std::fs::write(
        sources.join("metadata").join(format!("{key}.json")),
        serde_json::to_vec(&json!({
            "key": key,
            "title": key.to_uppercase(),
            "index": index,
            "length": index.len(),
        }))
        .unwrap(),
    )
    .unwrap();
    let path = sources.join(format!("{key}.txt"));
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn index_search_status_and_export() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write_source(
        root,
        "carmina",
        "odi et amo\namor vincit omnia\n",
        &["85", "86"],
    );
    write_source(root, "bellum", "bellum gerit\n", &["1.1"]);

    let out = stdout(&aventine(root, &["index", "carmina", "--no-progress"]));
    assert!(out.contains("Indexed 2 of 2 chunks of carmina"), "{out}");
    stdout(&aventine(root, &["index", "bellum", "--no-progress"]));

    // A second run finds nothing left to do.
    let out = stdout(&aventine(root, &["index", "carmina", "--no-progress"]));
    assert!(out.contains("already indexed"), "{out}");

    let out = stdout(&aventine(
        root,
        &["search", "vincit", "-l", "source", "-d", "bellum", "--json"],
    ));
    let report: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["language"], "source");
    for hit in report["results"].as_array().unwrap() {
        let documents = hit["documents"].as_array().unwrap();
        assert!(documents.iter().any(|d| d == "bellum"), "{hit}");
        assert!(!hit["lemma"].as_str().unwrap().starts_with("vincit "));
    }

    let out = stdout(&aventine(root, &["status", "--json"]));
    let status: Value = serde_json::from_str(&out).unwrap();
    assert!(status["sources_present"].as_bool().unwrap());
    let documents = status["documents"].as_array().unwrap();
    assert_eq!(documents.len(), 2);
    assert!(documents.iter().all(|d| d["complete"] == true));

    let out = stdout(&aventine(root, &["export-lemmatised", "carmina"]));
    assert_eq!(out.lines().count(), 2);
    assert!(out.lines().nth(1).unwrap().contains("vincit"));
}

#[test]
fn search_before_sources_exist_is_not_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let output = aventine(tmp.path(), &["search", "love"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No sources"));
}

#[test]
fn config_roundtrip_and_validation() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();

    stdout(&aventine(root, &["config", "set", "dimension", "32"]));
    let out = stdout(&aventine(root, &["config", "get", "dimension"]));
    assert_eq!(out.trim(), "32");

    let rejected = aventine(root, &["config", "set", "dimension", "0"]);
    assert!(!rejected.status.success());

    let out = stdout(&aventine(root, &["config", "list", "--json"]));
    let settings: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(settings, json!({ "dimension": "32" }));

    stdout(&aventine(root, &["config", "unset", "dimension"]));
    assert!(!aventine(root, &["config", "get", "dimension"]).status.success());
}
