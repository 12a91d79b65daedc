//! The memory-map reader (§4.1): turns `/proc/<pid>/maps` into the ordered
//! list of executable segments every other subsystem builds on.
//!
//! Grounded on the teacher's `debugee::registry::DwarfRegistry::update_mappings`,
//! which drives the same `proc-maps` crate off the same file; generalized
//! from "find the mapping for each already-known debug file" to "discover
//! every executable mapping in the target, coalesced by backing file".

use crate::error::Error;
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::PathBuf;

/// One coalesced executable region of the target's address space.
///
/// Consecutive `/proc/<pid>/maps` lines that share a backing file collapse
/// into a single region spanning `[min(starts), max(ends))`; non-executable
/// and anonymous (path starting with `[`, or pathless) mappings never reach
/// this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub path: PathBuf,
    pub start: u64,
    pub end: u64,
    pub is_main_exe: bool,
}

/// Reads and coalesces the target's memory map.
///
/// An unreadable map file is reported via [`Error::EntryNotExist`] when the
/// process itself is gone, or [`Error::IO`] otherwise - both are fatal at
/// startup per spec.md §4.1.
pub fn read(pid: Pid) -> Result<Vec<MemoryRegion>, Error> {
    let maps = proc_maps::get_process_maps(pid.as_raw()).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::EntryNotExist(pid)
        } else {
            Error::IO(e)
        }
    })?;

    let main_exe_id = file_id(&format!("/proc/{pid}/exe"));

    // keyed by (device, inode) rather than path text, per spec.md §4.1.
    let mut by_file: HashMap<(String, usize), (PathBuf, u64, u64, bool)> = HashMap::new();
    let mut order: Vec<(String, usize)> = Vec::new();

    for map in &maps {
        let Some(path) = map.filename() else { continue };
        if path.as_os_str().to_string_lossy().starts_with('[') {
            continue;
        }
        let key = (map.dev.clone(), map.inode);
        let start = map.start() as u64;
        let end = start + map.size() as u64;

        let entry = by_file.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            (path.to_path_buf(), start, end, false)
        });
        entry.1 = entry.1.min(start);
        entry.2 = entry.2.max(end);
        entry.3 |= map.is_exec();
    }

    let mut regions: Vec<MemoryRegion> = order
        .into_iter()
        .filter_map(|key| {
            let (path, start, end, saw_exec) = by_file.remove(&key)?;
            if !saw_exec {
                return None;
            }
            let is_main_exe = main_exe_id.as_ref().is_some_and(|id| *id == file_id_of_path(&path));
            Some(MemoryRegion { path, start, end, is_main_exe })
        })
        .collect();

    regions.sort_unstable_by_key(|r| r.start);
    Ok(regions)
}

/// Device/inode identity of a filesystem path, used to compare the main
/// executable link against a mapped region by identity rather than by
/// (possibly different, e.g. relative vs. canonicalized) path text.
fn file_id(path: &str) -> Option<(u64, u64)> {
    nix::sys::stat::stat(path)
        .ok()
        .map(|st| (st.st_dev as u64, st.st_ino as u64))
}

fn file_id_of_path(path: &std::path::Path) -> (u64, u64) {
    file_id(&path.to_string_lossy()).unwrap_or((0, 0))
}
