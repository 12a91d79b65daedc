//! End-to-end tests driving the compiled `obstack` binary, in the style of
//! the teacher's `tests/` directory but without a PTY: this tool is one-shot
//! and non-interactive, so a plain `std::process::Command` captures its
//! entire output in one wait. `demos/idle_threads.rs` (built as a sibling
//! `[[bin]]`, `obstack-demo-idle-threads`) is the companion target process,
//! the same role the teacher's `src/bin/mt.rs` plays for its own tests.

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::time::Duration;

fn obstack_bin() -> &'static str {
    env!("CARGO_BIN_EXE_obstack")
}

fn demo_bin() -> &'static str {
    env!("CARGO_BIN_EXE_obstack-demo-idle-threads")
}

/// Spawns the idle-threads companion with `n` workers and returns it once its
/// pid line has been read off stdout.
fn spawn_idle_threads(n: usize) -> (std::process::Child, u32) {
    let mut child = Command::new(demo_bin())
        .arg(n.to_string())
        .stdout(Stdio::piped())
        .spawn()
        .expect("failed to start companion process");

    let mut reader = BufReader::new(child.stdout.take().expect("piped stdout"));
    let mut line = String::new();
    reader.read_line(&mut line).expect("read companion pid line");
    let pid: u32 = line.trim().parse().expect("companion printed its pid");

    // keep the (now pipeless) stdout handle around so the child isn't killed
    // by a broken pipe once its internal buffer fills.
    std::mem::forget(reader);
    (child, pid)
}

fn is_stopped(tid: u32) -> bool {
    let Ok(status) = std::fs::read_to_string(format!("/proc/{tid}/status")) else {
        return false;
    };
    status
        .lines()
        .find(|l| l.starts_with("State:"))
        .is_some_and(|l| l.contains('T'))
}

fn task_ids(pid: u32) -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir(format!("/proc/{pid}/task")) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|e| e.file_name().to_str()?.parse().ok())
        .collect()
}

#[test]
fn missing_process_exits_with_entry_not_exist_code() {
    // pid 1 exists but is (practically) never also an unattached orphan we
    // could race with; instead pick a pid guaranteed absent: the max pid
    // space reread as a never-allocated value at test time.
    let absent_pid = "999999";
    let output = Command::new(obstack_bin())
        .arg(absent_pid)
        .output()
        .expect("failed to run obstack");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn usage_error_without_a_pid_exits_1() {
    let output = Command::new(obstack_bin()).output().expect("failed to run obstack");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn help_flag_exits_1_and_prints_usage() {
    let output = Command::new(obstack_bin())
        .arg("--help")
        .output()
        .expect("failed to run obstack");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("obstack"));
}

#[test]
fn version_flag_exits_0() {
    let output = Command::new(obstack_bin())
        .arg("--version")
        .output()
        .expect("failed to run obstack");
    assert_eq!(output.status.code(), Some(0));
}

/// Scenario 3 (spec.md §8): aggregated sampling of idle worker threads that
/// all share one stack. Requires `ptrace` permissions for the test process
/// to attach to its own child - not guaranteed in every CI sandbox, so this
/// is `#[ignore]`d; run locally with `cargo test -- --ignored`.
#[test]
#[ignore]
fn aggregated_sampling_groups_identical_idle_stacks() {
    const WORKERS: usize = 20;
    let (mut child, pid) = spawn_idle_threads(WORKERS);
    // give every worker thread time to reach the sleep call.
    std::thread::sleep(Duration::from_millis(200));

    let output = Command::new(obstack_bin())
        .args(["--agg", &pid.to_string()])
        .output()
        .expect("failed to run obstack");

    let _ = child.kill();
    let _ = child.wait();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Threads ("),
        "expected at least one aggregated group header, got:\n{stdout}"
    );

    // every worker thread called the same `idle` function with no
    // arguments, so they must all land in the same group.
    let has_full_group = stdout
        .lines()
        .filter(|l| l.starts_with("Threads ("))
        .any(|header| header.matches(", ").count() + 1 >= WORKERS);
    assert!(has_full_group, "no group captured all {WORKERS} idle workers:\n{stdout}");
}

/// Scenario 4 (spec.md §8): SIGINT mid-capture. The already-processed
/// threads must resume cleanly (none left in kernel state `T`) and the tool
/// must exit non-zero. `#[ignore]`d for the same ptrace-permission reason as
/// the aggregation test above.
#[test]
#[ignore]
fn interrupt_during_capture_resumes_already_processed_threads() {
    const WORKERS: usize = 64;
    let (mut child, pid) = spawn_idle_threads(WORKERS);
    std::thread::sleep(Duration::from_millis(200));

    let tids_before = task_ids(pid);

    let mut obstack = Command::new(obstack_bin())
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .spawn()
        .expect("failed to start obstack");

    // give obstack a moment to start attaching before interrupting it.
    std::thread::sleep(Duration::from_millis(30));
    unsafe {
        libc::kill(obstack.id() as i32, libc::SIGINT);
    }
    let status = obstack.wait().expect("failed to wait for obstack");

    assert!(!status.success());
    for tid in tids_before {
        assert!(!is_stopped(tid), "tid {tid} left stopped after interrupt");
    }

    let _ = child.kill();
    let _ = child.wait();
}
