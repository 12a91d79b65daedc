//! The fault-tolerant trampoline that the DWARF line resolver runs every
//! address lookup under.
//!
//! The DWARF library is allowed to read past mapped memory on malformed
//! debug sections. Rather than trust it, every lookup installs a per-thread
//! recovery point before calling in; if the process-wide handler for
//! `SIGABRT`/`SIGBUS`/`SIGFPE`/`SIGSEGV` fires, it jumps straight back to
//! that point instead of letting the signal run its default (terminating)
//! disposition.
use std::cell::Cell;
use std::os::raw::c_int;

#[repr(C, align(16))]
struct SigJmpBuf([u8; 256]);

impl SigJmpBuf {
    fn zeroed() -> Self {
        SigJmpBuf([0u8; 256])
    }
}

extern "C" {
    #[link_name = "__sigsetjmp"]
    fn sigsetjmp(env: *mut SigJmpBuf, savesigs: c_int) -> c_int;
    fn siglongjmp(env: *mut SigJmpBuf, val: c_int) -> !;
}

thread_local! {
    static RECOVERY_POINT: Cell<*mut SigJmpBuf> = Cell::new(std::ptr::null_mut());
}

const FATAL_SIGNALS: [c_int; 4] = [libc::SIGABRT, libc::SIGBUS, libc::SIGFPE, libc::SIGSEGV];

extern "C" fn handler(sig: c_int) {
    let target = RECOVERY_POINT.with(|cell| cell.get());
    if !target.is_null() {
        unsafe { siglongjmp(target, sig) }
    } else {
        // no address lookup in flight on this thread: this is a genuine
        // crash, restore the default disposition and re-raise it.
        unsafe {
            libc::signal(sig, libc::SIG_DFL);
            libc::raise(sig);
        }
    }
}

/// Installs the process-wide fatal-signal disposition. Must be called once,
/// after the tracing driver's child has been forked off, so a crash in
/// either process is isolated from the other's state.
pub fn install() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handler as usize;
        sa.sa_flags = libc::SA_NODEFER;
        libc::sigemptyset(&mut sa.sa_mask);
        for &sig in &FATAL_SIGNALS {
            if libc::sigaction(sig, &sa, std::ptr::null_mut()) != 0 {
                log::warn!(target: "obstack", "failed to install fatal-signal handler for {sig}");
            }
        }
    }
}

/// Runs `f` under the recovery trampoline. Returns `None` if a fatal signal
/// fired during `f` instead of letting it run to completion; the previous
/// thread-local recovery point (if any - lookups never nest in practice, but
/// this keeps the contract honest) is restored on every exit path.
pub fn guarded<F, T>(f: F) -> Option<T>
where
    F: FnOnce() -> T,
{
    let mut buf = SigJmpBuf::zeroed();
    let buf_ptr = &mut buf as *mut SigJmpBuf;

    let previous = RECOVERY_POINT.with(|cell| cell.replace(buf_ptr));
    let jumped_from = unsafe { sigsetjmp(buf_ptr, 1) };

    let result = if jumped_from == 0 { Some(f()) } else { None };

    RECOVERY_POINT.with(|cell| cell.set(previous));
    result
}
