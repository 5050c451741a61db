//! Exit codes and output streams of the `ls8-emu` binary.

use std::path::PathBuf;
use std::process::{Command, Output};

const DEMOS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos");

fn ls8_emu(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ls8-emu"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn demo(name: &str) -> String {
    format!("{}/{}", DEMOS, name)
}

/// Write `text` to a per-process temp file and return its path.
fn temp_image(name: &str, text: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("ls8-cli-{}-{}", std::process::id(), name));
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_halt_exits_zero() {
    let output = ls8_emu(&["run", &demo("mult.ls8")]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "72\n");
}

#[test]
fn test_asm_source_runs() {
    let output = ls8_emu(&["run", &demo("count.asm")]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "1\n2\n3\n4\n5\n");
}

#[test]
fn test_missing_file_exits_two() {
    let output = ls8_emu(&["run", "/definitely/not/here.ls8"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_parse_error_exits_two() {
    let path = temp_image("bad-literal.ls8", "10000010\n2\n");
    let output = ls8_emu(&["run", path.to_str().unwrap()]);
    std::fs::remove_file(&path).ok();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unknown_instruction_exits_one() {
    let path = temp_image("unknown.ls8", "11111111\n");
    let output = ls8_emu(&["run", path.to_str().unwrap()]);
    std::fs::remove_file(&path).ok();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown instruction"));
}

#[test]
fn test_bad_memory_size_exits_two() {
    let output = ls8_emu(&["run", "--memory-size", "0", &demo("mult.ls8")]);
    assert_eq!(output.status.code(), Some(2));

    let output = ls8_emu(&["run", "--memory-size", "300", &demo("mult.ls8")]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_image_larger_than_memory_exits_two() {
    // mult.ls8 is 12 bytes
    let output = ls8_emu(&["run", "--memory-size", "8", &demo("mult.ls8")]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_max_cycles_exits_one() {
    let output = ls8_emu(&["run", "--max-cycles", "5", &demo("count.asm")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max cycles"));
}

#[test]
fn test_trace_goes_to_stderr() {
    let output = ls8_emu(&["run", "--trace", &demo("print8.ls8")]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "8\n");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TRACE: 00 | 82 00 08 | 00 00 00 00 00 00 00 FF"));
}

#[test]
fn test_dump_state_is_json() {
    let output = ls8_emu(&["run", "--dump-state", &demo("print8.ls8")]);
    assert_eq!(output.status.code(), Some(0));

    let state: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(state["state"], "Halted");
    assert_eq!(state["cycles"], 3);
}

#[cfg(target_os = "linux")]
#[test]
fn test_unwritable_stdout_exits_one() {
    let full = std::fs::OpenOptions::new().write(true).open("/dev/full").unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_ls8-emu"))
        .arg("run")
        .arg(demo("mult.ls8"))
        .env_remove("RUST_LOG")
        .stdout(full)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}
