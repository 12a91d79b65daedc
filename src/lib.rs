//! `obstack`: attach to every thread of a running process, capture each
//! thread's call stack, and print symbolized backtraces - without keeping
//! the target under a debugger for its lifetime.
//!
//! The three subsystems in spec.md's overview map directly onto this
//! crate's top-level modules:
//!
//! - [`trace`] - the tracing driver: fork, attach, remote-unwind, detach.
//! - [`target`] - the memory-map reader and object index.
//! - [`symbolizer`] - the symbol-table and DWARF line resolvers, and the
//!   location cache that ties them together.
//!
//! [`config`] and [`error`] are the ambient configuration and error-kind
//! layers; [`present`] renders the captured, symbolized stacks.

pub mod config;
pub mod error;
pub mod present;
pub mod symbolizer;
pub mod target;
pub mod trace;

use config::Config;
use error::Error;

/// Runs one capture: trace the target, symbolize (unless `--no_parse`),
/// and print. This is the entire one-shot control flow described in
/// spec.md §2 - there is no persistent state and nothing runs after this
/// returns.
pub fn run(config: &Config) -> Result<(), Error> {
    let threads = trace::driver::trace(config)?;
    log::info!(target: "obstack", "captured {} thread(s)", threads.len());

    let (_regions, objects, pt_loads) = target::build(config.pid, config)?;

    if config.no_parse {
        present::no_parse(&threads, &objects, &pt_loads);
        return Ok(());
    }

    let all_addrs = threads.iter().flat_map(|t| t.addrs.iter().copied());
    let locations = symbolizer::cache::resolve_all(&pt_loads, &objects, all_addrs, config.no_lineno);

    if config.agg {
        present::aggregated(&threads, &locations);
    } else {
        present::per_thread(&threads, &locations);
    }
    Ok(())
}
