use crate::trace::shared::ThreadRecord;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use unwind::{AddressSpace, Cursor, PTraceState, RegNum};

const WAIT_RETRIES: u32 = 10;
const WAIT_RETRY_DELAY: Duration = Duration::from_micros(50);

/// Attaches to one thread, walks its stack into `record`, detaches - the
/// per-thread attach protocol, run entirely inside the forked child.
///
/// Every exit path - attach failure, a wait that never sees the thread
/// stop, a step that errors out - runs the scope-exit detach exactly once,
/// via [`DetachGuard`]. A thread that died in the interval (`ESRCH` on
/// attach) is skipped silently; any other attach failure is logged and
/// skipped too. Neither case leaves a capture for that thread.
pub fn capture_one(
    address_space: &AddressSpace,
    tid: i32,
    record: &mut ThreadRecord,
    interrupted: &AtomicBool,
) {
    if interrupted.load(Ordering::SeqCst) {
        return;
    }

    let pid = Pid::from_raw(tid);
    if let Err(e) = ptrace::attach(pid) {
        if e != nix::errno::Errno::ESRCH {
            log::warn!(target: "obstack", "ptrace attach failed for tid {tid}: {e}");
        }
        return;
    }
    let _detach = DetachGuard(pid);

    if !wait_for_stop(pid) {
        log::warn!(target: "obstack", "tid {tid} did not report stopped in time");
        return;
    }

    let state = match PTraceState::new(tid as u32) {
        Ok(s) => s,
        Err(e) => {
            log::warn!(target: "obstack", "failed to create unwind state for tid {tid}: {e}");
            return;
        }
    };
    let mut cursor = match Cursor::remote(address_space, &state) {
        Ok(c) => c,
        Err(e) => {
            log::warn!(target: "obstack", "failed to create unwind cursor for tid {tid}: {e}");
            return;
        }
    };

    loop {
        let ip = match cursor.register(RegNum::IP) {
            Ok(ip) => ip,
            Err(e) => {
                log::debug!(target: "obstack", "unwind register read failed for tid {tid}: {e}");
                break;
            }
        };
        if !record.push_addr(ip) {
            break;
        }
        match cursor.step() {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                log::debug!(target: "obstack", "unwind step failed for tid {tid}: {e}");
                break;
            }
        }
    }
}

struct DetachGuard(Pid);

impl Drop for DetachGuard {
    fn drop(&mut self) {
        if let Err(e) = ptrace::detach(self.0, None::<Signal>) {
            log::warn!(target: "obstack", "ptrace detach failed for tid {}: {e}", self.0);
        }
    }
}

fn wait_for_stop(pid: Pid) -> bool {
    for _ in 0..WAIT_RETRIES {
        match waitpid(pid, None) {
            Ok(WaitStatus::Stopped(_, _)) => return true,
            Ok(_) => {}
            Err(e) => {
                log::warn!(target: "obstack", "waitpid failed for {pid}: {e}");
                return false;
            }
        }
        std::thread::sleep(WAIT_RETRY_DELAY);
    }
    false
}
