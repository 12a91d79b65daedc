use crate::symbolizer::{dwarf, symtab};
use crate::target::object::{ObjectFile, PTLoad};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;

/// A fully resolved frame, cached by absolute address. Created lazily and
/// immutable once stored: two lookups of the same address are guaranteed to
/// return byte-identical values, since the cache never mutates an entry
/// after insertion.
#[derive(Debug, Clone)]
pub struct Location {
    pub object_path: String,
    pub function: String,
    pub source_file: Option<PathBuf>,
    pub line: u32,
}

impl Location {
    fn unresolved() -> Location {
        Location {
            object_path: "???".to_string(),
            function: "???".to_string(),
            source_file: None,
            line: 0,
        }
    }

    /// Whether this location carries usable line info, per the presenter's
    /// fallback rule: a zero line, or an empty/`"0"`/`"(null)"` filename, is
    /// treated as line-info absent.
    pub fn has_line_info(&self) -> bool {
        self.line != 0
            && self
                .source_file
                .as_ref()
                .is_some_and(|f| !f.as_os_str().is_empty() && f.as_os_str() != "0" && f.as_os_str() != "(null)")
    }
}

fn find_pt_load(pt_loads: &[PTLoad], addr: u64) -> Option<&PTLoad> {
    pt_loads
        .binary_search_by(|pt| {
            if addr < pt.start {
                Ordering::Greater
            } else if addr >= pt.end {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        })
        .ok()
        .map(|idx| &pt_loads[idx])
}

/// Resolves every distinct address in `addrs` against the object index,
/// batching DWARF lookups per debug-info path as required by the location
/// cache's batching-order invariant: addresses are collected first, then
/// symbolized, bounding resolver cost at O(distinct addresses) rather than
/// O(total captured frames).
pub fn resolve_all(
    pt_loads: &[PTLoad],
    objects: &[ObjectFile],
    addrs: impl IntoIterator<Item = u64>,
    skip_lineno: bool,
) -> HashMap<u64, Location> {
    let distinct: std::collections::HashSet<u64> = addrs.into_iter().collect();

    let mut cache = HashMap::with_capacity(distinct.len());
    // path -> [(absolute addr, file-relative offset)]
    let mut groups: HashMap<&std::path::Path, Vec<(u64, u64)>> = HashMap::new();

    for &addr in &distinct {
        let Some(pt) = find_pt_load(pt_loads, addr) else {
            cache.insert(addr, Location::unresolved());
            continue;
        };
        let object = &objects[pt.object_index];
        let offset = pt.to_file_relative(object, addr);
        groups
            .entry(object.debuginfo_path.as_path())
            .or_default()
            .push((addr, offset));
    }

    for (debuginfo_path, members) in groups {
        let offsets: Vec<u64> = members.iter().map(|(_, off)| *off).collect();
        let lines = if skip_lineno {
            vec![dwarf::ResolvedLine::default(); offsets.len()]
        } else {
            dwarf::resolve_batch(debuginfo_path, &offsets)
        };

        for ((addr, offset), line) in members.into_iter().zip(lines) {
            let pt = find_pt_load(pt_loads, addr).expect("pt load located above");
            let object = &objects[pt.object_index];
            let raw_name = symtab::resolve(object, offset);
            let function = if raw_name == "???" {
                raw_name
            } else {
                symtab::demangle(&raw_name)
            };

            cache.insert(
                addr,
                Location {
                    object_path: object.path.display().to_string(),
                    function,
                    source_file: line.file,
                    line: line.line,
                },
            );
        }
    }

    cache
}
