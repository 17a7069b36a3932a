use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn linetally_bin() -> &'static str {
    env!("CARGO_BIN_EXE_linetally")
}

fn write_file(path: &Path, contents: &str) {
    fs::write(path, contents).expect("failed to write test file");
}

fn populate_tree(root: &Path) {
    write_file(&root.join("a.go"), "package a\n\n// one\nfunc A() {}\n");
    write_file(&root.join("b.go"), "package b\n/*\nblock\n*/\n");
    write_file(&root.join("c.py"), "# hello\nprint(1)\n\n");
    write_file(&root.join("d.rs"), "fn main() {}\n");
    let sub = root.join("sub");
    fs::create_dir(&sub).expect("failed to create sub directory");
    write_file(&sub.join("e.js"), "let x = 1\n// two\n");
    write_file(&sub.join("f.ts"), "const y = 2\n");
    let deeper = sub.join("deeper");
    fs::create_dir(&deeper).expect("failed to create deeper directory");
    write_file(&deeper.join("g.yaml"), "k: v\n# note\n");
}

fn run_with_workers(root: &Path, workers: &str) -> Vec<u8> {
    let output = Command::new(linetally_bin())
        .arg(root)
        .arg("--workers")
        .arg(workers)
        .output()
        .expect("failed to execute linetally");
    assert!(
        output.status.success(),
        "expected success with {workers} workers, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output.stdout
}

#[test]
fn cli_worker_count_does_not_change_output() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    populate_tree(temp_dir.path());

    let single = run_with_workers(temp_dir.path(), "1");
    let pair = run_with_workers(temp_dir.path(), "2");
    let many = run_with_workers(temp_dir.path(), "8");

    assert_eq!(
        single, pair,
        "1 and 2 workers must produce identical tables"
    );
    assert_eq!(
        pair, many,
        "2 and 8 workers must produce identical tables"
    );
}

#[test]
fn cli_default_worker_count_matches_explicit_run() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    populate_tree(temp_dir.path());

    let defaulted = Command::new(linetally_bin())
        .arg(temp_dir.path())
        .output()
        .expect("failed to execute linetally");
    assert!(defaulted.status.success(), "expected success");

    let explicit = run_with_workers(temp_dir.path(), "1");
    assert_eq!(
        defaulted.stdout, explicit,
        "the default pool size must not affect the final table"
    );
}
