// CLI smoke tests against synthetic databases.
mod common;

use assert_cmd::Command;
use common::{two_piece_slices, Oracle, WldDbBuilder, WldFormat};
use damdb::db::Value;
use damdb::engine::Color;
use damdb::indexing::slice_size;
use predicates::prelude::*;

#[test]
fn identify_reports_failure_on_empty_dir() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("damdb")
        .unwrap()
        .args(["identify", "-d", dir.path().to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn identify_finds_dtw_by_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("db4.idx_dtw"), b"stub").unwrap();
    Command::cargo_bin("damdb")
        .unwrap()
        .args(["identify", "-d", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("dtw 4"));
}

#[test]
fn lookup_with_explicit_type() {
    let oracle = Oracle::build();
    let dir = tempfile::tempdir().unwrap();
    let mut b = WldDbBuilder::new(WldFormat::Runlen);
    for s in two_piece_slices() {
        for color in [Color::Black, Color::White] {
            let values: Vec<Value> =
                (0..slice_size(&s)).map(|i| oracle.stored(&s, color, i)).collect();
            b.add_values(&s, color, &values);
        }
    }
    b.write(dir.path(), "db2");

    // Two lone kings, no contact: a draw.
    Command::cargo_bin("damdb")
        .unwrap()
        .args([
            "lookup",
            "-d",
            dir.path().to_str().unwrap(),
            "-t",
            "wld_runlen",
            "-o",
            "maxpieces=2",
            "-f",
            "B:WK46:BK5",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Draw"));
}

#[test]
fn verify_passes_on_unmanifested_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = WldDbBuilder::new(WldFormat::Runlen);
    let s = damdb::indexing::Slice::new(0, 1, 0, 1);
    b.add_single(&s, Color::Black, '=');
    let men = damdb::indexing::Slice::new(1, 0, 1, 0);
    let draws = vec![Value::Draw; slice_size(&men) as usize];
    b.add_values(&men, Color::Black, &draws);
    b.write(dir.path(), "db2");

    Command::cargo_bin("damdb")
        .unwrap()
        .args([
            "verify",
            "-d",
            dir.path().to_str().unwrap(),
            "-t",
            "wld_runlen",
            "-o",
            "maxpieces=2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("no errors"));
}
