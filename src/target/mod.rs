//! The memory-map reader (§4.1) and object index (§4.2): turns a live
//! process's mapped objects into the sorted [`object::PTLoad`] list every
//! resolver in [`crate::symbolizer`] binary-searches against.

pub mod maps;
pub mod object;

use crate::config::Config;
use crate::error::Error;
use self::maps::MemoryRegion;
use self::object::{ObjectFile, PTLoad};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::PathBuf;

/// Reads the target's memory map, loads one [`ObjectFile`] per unique
/// mapped path, and builds the sorted [`PTLoad`] list tying mapped ranges
/// back to their object.
///
/// `--symbol_path`/`--debuginfo_path` only override the source used for the
/// main executable's region (spec.md §6); every other mapped object is
/// loaded from the path the memory map itself names. A load failure for the
/// main executable is fatal and propagated - it is either the program
/// itself being unreadable or an explicitly-named `--symbol_path`/
/// `--debuginfo_path` that doesn't exist, both fatal-at-startup per
/// spec.md §7. A load failure for any other mapped object (a shared
/// library this process happens to have mapped but can no longer read, for
/// instance after it was removed from disk) is logged and skipped instead:
/// the capture still has useful work to do without it.
pub fn build(pid: Pid, config: &Config) -> Result<(Vec<MemoryRegion>, Vec<ObjectFile>, Vec<PTLoad>), Error> {
    let regions = maps::read(pid)?;

    let mut objects: Vec<ObjectFile> = Vec::new();
    let mut index_of: HashMap<PathBuf, usize> = HashMap::new();
    let mut pt_loads: Vec<PTLoad> = Vec::with_capacity(regions.len());

    for region in &regions {
        let object_index = match index_of.get(&region.path) {
            Some(&idx) => idx,
            None => {
                let (symbol_override, debuginfo_override) = if region.is_main_exe {
                    (config.symbol_path.as_deref(), config.debuginfo_path.as_deref())
                } else {
                    (None, None)
                };
                let object = match ObjectFile::load(&region.path, symbol_override, debuginfo_override) {
                    Ok(object) => object,
                    Err(e) if region.is_main_exe => return Err(e),
                    Err(e) => {
                        log::warn!(target: "obstack", "failed to load object {}: {e}", region.path.display());
                        continue;
                    }
                };
                let idx = objects.len();
                objects.push(object);
                index_of.insert(region.path.clone(), idx);
                idx
            }
        };

        pt_loads.push(PTLoad {
            start: region.start,
            end: region.end,
            object_index,
            is_main_exe: region.is_main_exe,
        });
    }

    pt_loads.sort_unstable_by_key(|pt| pt.start);
    Ok((regions, objects, pt_loads))
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(symbol_path: Option<&str>, debuginfo_path: Option<&str>) -> Config {
        Config {
            pid: Pid::this(),
            log_level: log::LevelFilter::Warn,
            no_parse: false,
            agg: false,
            symbol_path: symbol_path.map(String::from),
            debuginfo_path: debuginfo_path.map(String::from),
            no_lineno: false,
            thread_only: false,
        }
    }

    /// spec.md §7: a `--debuginfo_path` explicitly named on the CLI that
    /// doesn't exist is fatal at startup, not a warning followed by
    /// degraded output.
    #[test]
    fn missing_explicit_debuginfo_path_fails_the_whole_build() {
        let cfg = config(None, Some("/no/such/debuginfo-file"));
        let err = build(Pid::this(), &cfg).expect_err("a missing explicit override must be fatal");
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_explicit_symbol_path_fails_the_whole_build() {
        let cfg = config(Some("/no/such/symbol-file"), None);
        let err = build(Pid::this(), &cfg).expect_err("a missing explicit override must be fatal");
        assert!(err.is_fatal());
    }

    #[test]
    fn own_process_builds_a_non_empty_object_index_without_overrides() {
        let cfg = config(None, None);
        let (_regions, objects, pt_loads) = build(Pid::this(), &cfg).expect("building our own index never fails");
        assert!(!objects.is_empty());
        assert!(!pt_loads.is_empty());
    }
}
