use crate::config::Config;
use crate::error::Error;
use crate::trace::child;
use crate::trace::shared::{SharedThreadTable, ThreadRecord};
use nix::sys::signal::{self, SigSet, Signal, SigmaskHow};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::ffi::CString;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use unwind::{Accessors, AddressSpace, Byteorder};

/// One thread's captured stack, owned by the driver and handed off to the
/// presenter once tracing is done.
#[derive(Debug, Clone)]
pub struct Thread {
    pub tid: i32,
    pub name: String,
    pub addrs: Vec<u64>,
    pub rendered_hex: String,
}

impl Thread {
    fn from_record(record: &ThreadRecord) -> Thread {
        let addrs = record.addrs().to_vec();
        let rendered_hex = render_hex(&addrs);
        Thread {
            tid: record.tid,
            name: record.name(),
            addrs,
            rendered_hex,
        }
    }
}

/// The rendered hex key used for stack aggregation: a faithful
/// serialization of the address sequence (equal sequences produce equal
/// keys, unequal sequences produce unequal keys).
fn render_hex(addrs: &[u64]) -> String {
    addrs
        .iter()
        .map(|a| format!("{a:x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Enumerates the target's threads, forks, and runs the per-thread attach/
/// unwind/detach protocol in the child while the parent waits. Returns the
/// threads that were successfully captured.
///
/// This is the tracing driver (§4.6): the parent blocks interrupt-class
/// signals for the duration of the fork+wait, so that a user's Ctrl-C
/// reaches the child (which turns it into an interrupt flag) rather than
/// killing the parent mid-wait.
pub fn trace(config: &Config) -> Result<Vec<Thread>, Error> {
    let thread_ids = enumerate_threads(config.pid, config.thread_only)?;
    if thread_ids.is_empty() {
        return Err(Error::EntryNotExist(config.pid));
    }

    let table = SharedThreadTable::new(&thread_ids)?;

    let mut interrupt_sigset = SigSet::empty();
    interrupt_sigset.add(Signal::SIGHUP);
    interrupt_sigset.add(Signal::SIGINT);
    interrupt_sigset.add(Signal::SIGTERM);

    signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&interrupt_sigset), None).map_err(Error::Ptrace)?;

    match unsafe { fork() }.map_err(Error::Fork)? {
        ForkResult::Parent { child: child_pid } => {
            let status = waitpid(child_pid, None).map_err(Error::Waitpid)?;
            // signals are unblocked only after the child's outcome is known,
            // so the parent cannot be interrupted mid-wait.
            let _ = signal::sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&interrupt_sigset), None);

            // installed only now: a crash while parsing DWARF in this
            // process must not touch the child's (already-exited) state.
            crate::symbolizer::fault::install();

            match status {
                WaitStatus::Exited(_, 0) => {}
                WaitStatus::Exited(_, code) => {
                    log::warn!(target: "obstack", "tracing child exited with status {code}");
                }
                WaitStatus::Signaled(_, sig, _) => {
                    return Err(Error::UnexpectedError(format!(
                        "tracing child was killed by signal {sig}"
                    )));
                }
                other => {
                    return Err(Error::UnexpectedError(format!(
                        "unexpected wait status for tracing child: {other:?}"
                    )));
                }
            }

            let threads: Vec<Thread> = table
                .as_slice()
                .iter()
                .filter(|r| r.is_valid())
                .map(Thread::from_record)
                .collect();

            for (tid, _) in &thread_ids {
                if is_thread_stopped(*tid) {
                    log::warn!(target: "obstack", "attention: thread {tid} is still stopped after detach");
                }
            }

            Ok(threads)
        }
        ForkResult::Child => {
            let _ = signal::sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&interrupt_sigset), None);

            let interrupted = Arc::new(AtomicBool::new(false));
            for sig in [
                signal_hook::consts::SIGHUP,
                signal_hook::consts::SIGINT,
                signal_hook::consts::SIGTERM,
            ] {
                let _ = signal_hook::flag::register(sig, interrupted.clone());
            }

            disguise_process_name();

            let address_space = match AddressSpace::new(Accessors::ptrace(), Byteorder::DEFAULT) {
                Ok(a) => a,
                Err(e) => {
                    log::error!(target: "obstack", "failed to create remote address space: {e}");
                    std::process::exit(1);
                }
            };

            let records = table.as_mut_slice();
            for (i, (tid, _name)) in thread_ids.iter().enumerate() {
                if interrupted.load(Ordering::SeqCst) {
                    log::warn!(target: "obstack", "interrupted after {i} of {} threads", thread_ids.len());
                    break;
                }
                child::capture_one(&address_space, *tid, &mut records[i], &interrupted);
            }

            std::process::exit(0);
        }
    }
}

/// Renames the child in `/proc/<pid>/comm` so it doesn't show up in `ps`
/// output as a bare duplicate of the parent's command line. The historical
/// trick of reversing `argv` in place isn't available here - Rust's
/// runtime doesn't hand `main` a raw, mutable `argv` the way C does - so
/// this uses the kernel's own per-task name instead, which every process
/// inspection tool already reads.
fn disguise_process_name() {
    if let Ok(name) = CString::new("obstack (tracer)") {
        unsafe {
            libc::prctl(libc::PR_SET_NAME, name.as_ptr(), 0, 0, 0);
        }
    }
}

fn enumerate_threads(pid: Pid, thread_only: bool) -> Result<Vec<(i32, String)>, Error> {
    if thread_only {
        return Ok(vec![(pid.as_raw(), thread_name(pid.as_raw()).unwrap_or_default())]);
    }

    let task_dir = format!("/proc/{pid}/task");
    let entries = fs::read_dir(&task_dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::EntryNotExist(pid)
        } else {
            Error::OpenDirFailed(e)
        }
    })?;

    let mut threads = Vec::new();
    for entry in entries.flatten() {
        let Some(tid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        threads.push((tid, thread_name(tid).unwrap_or_default()));
    }
    threads.sort_unstable_by_key(|(tid, _)| *tid);
    Ok(threads)
}

fn thread_name(tid: i32) -> Option<String> {
    let comm = fs::read_to_string(format!("/proc/{tid}/comm")).ok()?;
    Some(comm.trim().to_string())
}

/// Checks the kernel-reported state of a thread for the post-run warning:
/// a thread still in state `T` (stopped) means a detach did not resume it.
fn is_thread_stopped(tid: i32) -> bool {
    let Ok(status) = fs::read_to_string(format!("/proc/{tid}/status")) else {
        return false;
    };
    status
        .lines()
        .find(|line| line.starts_with("State:"))
        .is_some_and(|line| line.contains('T'))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn render_hex_is_a_faithful_serialization() {
        assert_eq!(render_hex(&[0x10, 0x20]), render_hex(&[0x10, 0x20]));
        assert_ne!(render_hex(&[0x10, 0x20]), render_hex(&[0x10, 0x21]));
        assert_ne!(render_hex(&[0x10]), render_hex(&[0x10, 0x20]));
    }
}
