#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use csv::ReaderBuilder;
use serde_json::Value;
use tempfile::TempDir;

fn setup_csv(contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("edges.csv");
    fs::write(&path, contents).expect("write csv");
    (dir, path)
}

fn isolated_config(dir: &TempDir) -> PathBuf {
    dir.path().join("missing.toml")
}

fn run_json(dir: &TempDir, args: &[&str], csv: &Path) -> Value {
    let output = cargo_bin_cmd!("dg")
        .env("DG_CONFIG", isolated_config(dir))
        .args(["--format", "json"])
        .args(args)
        .arg(csv)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json output")
}

const EDGES: &str = "src,dst,t,w\n2,3,1,0.5\n10,20,5,1.5\n10,20,5,2.5\n4,5,65,3.0\n";

#[test]
fn stats_reports_graph_scalars() {
    let (dir, csv) = setup_csv(EDGES);
    let stats = run_json(&dir, &["stats"], &csv);
    assert_eq!(stats["backend"], "bucket");
    assert_eq!(stats["time_delta"], "TimeDelta(unit='r')");
    assert_eq!(stats["start_time"], 1);
    assert_eq!(stats["end_time"], 65);
    assert_eq!(stats["num_nodes"], 21);
    assert_eq!(stats["num_edges"], 3);
    assert_eq!(stats["num_events"], 4);
    assert_eq!(stats["num_timestamps"], 3);
    assert_eq!(stats["time_granularity"], 4);
    assert!(stats["edge_feats_shape"].is_null());
}

#[test]
fn stats_honours_feature_and_backend_flags() {
    let (dir, csv) = setup_csv(EDGES);
    let stats = run_json(
        &dir,
        &["stats", "--feature-cols", "w", "--backend", "list", "--time-unit", "s"],
        &csv,
    );
    assert_eq!(stats["backend"], "list");
    assert_eq!(stats["time_delta"], "TimeDelta(unit='s', value=1)");
    assert_eq!(stats["edge_feats_shape"], serde_json::json!([1]));
}

#[test]
fn batches_walk_the_edge_list() {
    let (dir, csv) = setup_csv(EDGES);
    let batches = run_json(&dir, &["batches", "--batch-size", "3"], &csv);
    let batches = batches.as_array().expect("array");
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0]["edges"], 3);
    assert_eq!(batches[0]["first_time"], 1);
    assert_eq!(batches[1]["edges"], 1);
    assert_eq!(batches[1]["last_time"], 65);

    let dropped = run_json(&dir, &["batches", "--batch-size", "3", "--drop-last"], &csv);
    assert_eq!(dropped.as_array().map(Vec::len), Some(1));
}

#[test]
fn physical_batches_need_a_physical_graph() {
    let (dir, csv) = setup_csv(EDGES);
    cargo_bin_cmd!("dg")
        .env("DG_CONFIG", isolated_config(&dir))
        .args(["batches", "--batch-unit", "m"])
        .arg(&csv)
        .assert()
        .failure();

    let batches = run_json(
        &dir,
        &["batches", "--time-unit", "s", "--batch-unit", "m", "--no-features"],
        &csv,
    );
    let batches = batches.as_array().expect("array");
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0]["edges"], 3);
    assert!(batches[0]["edge_feats_rows"].is_null());
}

#[test]
fn coarsen_writes_a_new_edge_list() {
    let (dir, csv) = setup_csv(EDGES);
    let out = dir.path().join("coarse.csv");
    let report = run_json(
        &dir,
        &[
            "coarsen",
            "--time-unit",
            "s",
            "--feature-cols",
            "w",
            "--to",
            "m",
            "--agg",
            "mean",
            "--out",
            out.to_str().expect("utf8 path"),
        ],
        &csv,
    );
    assert_eq!(report["source_events"], 4);
    assert_eq!(report["coarse_events"], 3);
    assert_eq!(report["agg"], "mean");

    let mut reader = ReaderBuilder::new().from_path(&out).expect("open output");
    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.expect("row").iter().map(str::to_string).collect())
        .collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], vec!["10", "20", "0", "2"]);
    assert_eq!(rows[2], vec!["4", "5", "1", "3"]);
}

#[test]
fn config_file_supplies_defaults() {
    let (dir, _) = setup_csv("");
    let csv = dir.path().join("renamed.csv");
    fs::write(&csv, "from,to,when\n0,1,0\n1,2,10\n2,3,20\n").expect("write csv");
    let config = dir.path().join("dg.toml");
    fs::write(
        &config,
        "[csv]\nsrc_col = \"from\"\ndst_col = \"to\"\ntime_col = \"when\"\n\n\
         [graph]\nbackend = \"list\"\n\n[loader]\nbatch_size = 2\n",
    )
    .expect("write config");

    let output = cargo_bin_cmd!("dg")
        .args(["--format", "json", "--config"])
        .arg(&config)
        .arg("batches")
        .arg(&csv)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let batches: Value = serde_json::from_slice(&output).expect("json output");
    assert_eq!(batches.as_array().map(Vec::len), Some(2));
}

#[test]
fn bad_config_is_reported() {
    let (dir, csv) = setup_csv(EDGES);
    let config = dir.path().join("dg.toml");
    fs::write(&config, "[loader\nbatch_size = ").expect("write config");
    let output = cargo_bin_cmd!("dg")
        .args(["--config"])
        .arg(&config)
        .arg("stats")
        .arg(&csv)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("dg.toml"), "{stderr}");
}

#[test]
fn text_output_lists_sections() {
    let (dir, csv) = setup_csv(EDGES);
    let output = cargo_bin_cmd!("dg")
        .env("DG_CONFIG", isolated_config(&dir))
        .args(["--quiet", "stats"])
        .arg(&csv)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("Graph"), "{text}");
    assert!(text.contains("nodes: 21"), "{text}");
}
