use std::process::Command;
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_blocksync").to_string()
}

#[test]
fn cli_reconcile_roundtrip() {
    let dir = tempdir().unwrap();
    let stale = dir.path().join("stale.img");
    let current = dir.path().join("current.img");
    let fp = dir.path().join("stale.fp");
    let patch = dir.path().join("delta.blockpatch");

    std::fs::write(&stale, b"aaaabbbbccccdd").unwrap();
    std::fs::write(&current, b"aaaaBBBBccccDD").unwrap();

    let st = Command::new(bin())
        .args(["fingerprint", "--chunk-size", "4", "-o"])
        .arg(&fp)
        .arg(&stale)
        .status()
        .unwrap();
    assert!(st.success());

    let st = Command::new(bin())
        .args(["build-patch", "--fingerprint"])
        .arg(&fp)
        .arg("-o")
        .arg(&patch)
        .arg(&current)
        .status()
        .unwrap();
    assert!(st.success());
    assert!(patch.exists());

    let st = Command::new(bin())
        .args(["apply", "--patch"])
        .arg(&patch)
        .arg(&stale)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(
        std::fs::read(&stale).unwrap(),
        std::fs::read(&current).unwrap()
    );
}

#[test]
fn cli_build_patch_reports_unchanged() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("data.img");
    std::fs::write(&file, b"steady-state").unwrap();

    let st = Command::new(bin())
        .args(["fingerprint", "--chunk-size", "4"])
        .arg(&file)
        .status()
        .unwrap();
    assert!(st.success());

    let out = Command::new(bin())
        .arg("build-patch")
        .arg(&file)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(
        String::from_utf8_lossy(&out.stdout).contains("unchanged"),
        "stdout: {}",
        String::from_utf8_lossy(&out.stdout)
    );
    assert!(!dir.path().join("data.img.blockpatch").exists());
}

#[test]
fn cli_diff_prints_changed_indices() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.img");
    let b = dir.path().join("b.img");
    std::fs::write(&a, b"aaaabbbbcccc").unwrap();
    std::fs::write(&b, b"aaaaXXXXcccc").unwrap();

    for f in [&a, &b] {
        let st = Command::new(bin())
            .args(["fingerprint", "--chunk-size", "4"])
            .arg(f)
            .status()
            .unwrap();
        assert!(st.success());
    }

    let out = Command::new(bin())
        .args(["diff", "--old"])
        .arg(dir.path().join("a.img.fingerprint"))
        .arg("--new")
        .arg(dir.path().join("b.img.fingerprint"))
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "1");
}

#[test]
fn cli_show_identifies_artifacts() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("data.img");
    std::fs::write(&file, b"0123456789").unwrap();

    let st = Command::new(bin())
        .args(["fingerprint", "--chunk-size", "4"])
        .arg(&file)
        .status()
        .unwrap();
    assert!(st.success());

    let out = Command::new(bin())
        .args(["--json", "show"])
        .arg(dir.path().join("data.img.fingerprint"))
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["kind"], "fingerprint");
    assert_eq!(v["chunk_size"], 4);
    assert_eq!(v["chunks"], 3);
}

#[test]
fn cli_refuses_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("data.img");
    std::fs::write(&file, b"payload").unwrap();

    let st = Command::new(bin())
        .args(["fingerprint", "--chunk-size", "4"])
        .arg(&file)
        .status()
        .unwrap();
    assert!(st.success());

    let st = Command::new(bin())
        .args(["fingerprint", "--chunk-size", "4"])
        .arg(&file)
        .status()
        .unwrap();
    assert!(!st.success());

    let st = Command::new(bin())
        .args(["--force", "fingerprint", "--chunk-size", "4"])
        .arg(&file)
        .status()
        .unwrap();
    assert!(st.success());
}
