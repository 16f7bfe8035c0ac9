use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

/// Ring graphs of 8..8+count nodes in dataset-file JSON.
fn write_rings(dir: &Path, name: &str, count: usize) {
    let graphs: Vec<String> = (8..8 + count)
        .map(|n| {
            let edges: Vec<String> = (0..n).map(|i| format!("[{},{}]", i, (i + 1) % n)).collect();
            format!(r#"{{"num_nodes":{},"edges":[{}]}}"#, n, edges.join(","))
        })
        .collect();
    let content = format!(r#"{{"task":"graph","graphs":[{}]}}"#, graphs.join(","));
    fs::write(dir.join(format!("{name}.json")), content).unwrap();
}

#[test]
fn test_cli_stats() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    write_rings(dir.path(), "rings", 10);

    let mut cmd = Command::cargo_bin("neuromatch")?;
    cmd.arg("stats").arg("rings").arg("--root").arg(dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Dataset rings"))
        .stdout(predicate::str::contains("Train graphs:    8"))
        .stdout(predicate::str::contains("Test graphs:    2"));
    Ok(())
}

#[test]
fn test_cli_stats_unknown_dataset() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    let mut cmd = Command::cargo_bin("neuromatch")?;
    cmd.arg("stats").arg("missing").arg("--root").arg(dir.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown dataset: missing"));
    Ok(())
}

#[test]
fn test_cli_sample_on_the_fly() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("neuromatch")?;
    cmd.arg("sample")
        .arg("--kind")
        .arg("on-the-fly")
        .arg("--batch-size")
        .arg("8");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Sampled on-the-fly batch"))
        .stdout(predicate::str::is_match(r"pos_target\s+4 graphs")?)
        .stdout(predicate::str::is_match(r"neg_query\s+4 graphs")?);
    Ok(())
}

#[test]
fn test_cli_sample_from_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    write_rings(dir.path(), "rings", 10);
    let config = dir.path().join("source.json");
    fs::write(
        &config,
        r#"{"kind": "disk", "dataset": "rings", "min_size": 4, "max_size": 8, "node_anchored": true}"#,
    )?;

    let mut cmd = Command::cargo_bin("neuromatch")?;
    cmd.arg("sample")
        .arg("--config")
        .arg(&config)
        .arg("--root")
        .arg(dir.path())
        .arg("--batch-size")
        .arg("6")
        .arg("--eval");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Sampled disk batch"))
        .stdout(predicate::str::is_match(r"pos_query\s+3 graphs")?);
    Ok(())
}

#[test]
fn test_cli_warm_cache() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cache = dir.path().join("cache");

    let mut cmd = Command::cargo_bin("neuromatch")?;
    cmd.arg("warm-cache")
        .arg("--dataset")
        .arg("syn")
        .arg("--batches")
        .arg("3")
        .arg("--batch-size")
        .arg("4")
        .arg("--cache-dir")
        .arg(&cache);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Labeled 3 batches"));

    let mut names: Vec<String> = fs::read_dir(&cache)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    names.sort();
    assert_eq!(
        names,
        vec![
            "imbalanced-syn-false-false-false-true-0",
            "imbalanced-syn-false-false-false-true-1",
            "imbalanced-syn-false-false-false-true-2",
        ]
    );
    Ok(())
}
