use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, r#"{{"op": "setCredential", "key": "pk_test_1"}}"#).unwrap();
    writeln!(script, r#"{{"op": "updateContext", "amount": 100}}"#).unwrap();

    let mut cmd = Command::new(cargo_bin!("paybridge"));
    cmd.arg(script.path()).arg("--prefs-path").arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Persistent storage requested via --prefs-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory preferences."));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, r#"{{"op": "setCredential", "key": "pk_test_1"}}"#).unwrap();
    writeln!(script, r#"{{"op": "updateContext", "amount": 100}}"#).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("prefs_db");

    let mut cmd = Command::new(cargo_bin!("paybridge"));
    cmd.arg(script.path()).arg("--prefs-path").arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Falling back").not());
}
