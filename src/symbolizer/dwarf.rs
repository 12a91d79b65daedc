use crate::symbolizer::fault;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A resolved (or unresolved) source location. `line == 0` means
/// unresolved, per the DWARF line resolver's contract.
#[derive(Debug, Clone, Default)]
pub struct ResolvedLine {
    pub file: Option<PathBuf>,
    pub line: u32,
}

/// Resolves a batch of file-relative addresses against one object path.
///
/// Each address lookup runs under the fault-tolerant trampoline
/// ([`fault::guarded`]); a fatal signal delivered while processing one
/// address only drops that address, the rest of the batch proceeds.
/// Batching per path, rather than resolving one address at a time, amortizes
/// the cost of opening the file and building the line-number program.
pub fn resolve_batch(debuginfo_path: &Path, offsets: &[u64]) -> Vec<ResolvedLine> {
    let unresolved = || vec![ResolvedLine::default(); offsets.len()];

    let file = match File::open(debuginfo_path) {
        Ok(f) => f,
        Err(e) => {
            log::warn!(target: "obstack", "failed to open {}: {e}", debuginfo_path.display());
            return unresolved();
        }
    };
    let mapped = match unsafe { Mmap::map(&file) } {
        Ok(m) => m,
        Err(e) => {
            log::warn!(target: "obstack", "failed to map {}: {e}", debuginfo_path.display());
            return unresolved();
        }
    };
    let obj = match object::File::parse(&*mapped) {
        Ok(o) => o,
        Err(e) => {
            log::warn!(target: "obstack", "failed to parse {}: {e}", debuginfo_path.display());
            return unresolved();
        }
    };
    let ctx = match addr2line::Context::new(&obj) {
        Ok(c) => c,
        Err(e) => {
            log::warn!(target: "obstack", "no usable dwarf in {}: {e}", debuginfo_path.display());
            return unresolved();
        }
    };

    offsets
        .iter()
        .map(|&offset| {
            let outcome = fault::guarded(|| ctx.find_location(offset));
            match outcome {
                None => {
                    log::debug!(target: "obstack", "dwarf lookup faulted at offset {offset:#x} in {}", debuginfo_path.display());
                    ResolvedLine::default()
                }
                Some(Err(e)) => {
                    log::debug!(target: "obstack", "dwarf lookup failed at offset {offset:#x}: {e}");
                    ResolvedLine::default()
                }
                Some(Ok(None)) => ResolvedLine::default(),
                Some(Ok(Some(loc))) => ResolvedLine {
                    file: loc.file.map(PathBuf::from),
                    line: loc.line.unwrap_or(0),
                },
            }
        })
        .collect()
}
