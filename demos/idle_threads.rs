//! Companion target for the live-process integration tests under `tests/`.
//!
//! Spawns `N` worker threads (first CLI argument, default 8) that all park in
//! the same `idle` function, so their captured stacks are byte-identical -
//! the scenario the aggregated-sampling end-to-end case needs. Prints its own
//! pid on the first line so the test harness can attach to it, then blocks
//! long enough for a `ptrace` attach/unwind/detach pass to complete.

use std::thread;
use std::time::Duration;

fn main() {
    let n: usize = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(8);

    println!("{}", std::process::id());
    use std::io::Write;
    let _ = std::io::stdout().flush();

    let handles: Vec<_> = (0..n).map(|_| thread::spawn(idle)).collect();
    idle();
    for h in handles {
        let _ = h.join();
    }
}

fn idle() {
    thread::sleep(Duration::from_secs(30));
}
