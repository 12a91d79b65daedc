//! The result presenter (§4.7): per-thread output, stack-aggregated output,
//! and the symbolization-free `--no_parse` mode. Coloring is gated on
//! whether standard output is a terminal, the same simplification the
//! teacher's console UI makes when it has no TUI layer to route through.

use crate::symbolizer::cache::Location;
use crate::target::object::{ObjectFile, PTLoad};
use crate::trace::driver::Thread;
use itertools::Itertools;
use std::collections::HashMap;
use std::io::IsTerminal;

const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

fn colorize(s: &str, code: &str) -> String {
    if std::io::stdout().is_terminal() {
        format!("{code}{s}{RESET}")
    } else {
        s.to_string()
    }
}

/// One rendered `#N 0x<addr> in ...` frame line.
fn render_frame(n: usize, addr: u64, loc: Option<&Location>) -> String {
    let addr_str = colorize(&format!("{addr:#x}"), YELLOW);
    match loc {
        None => format!("#{n} {addr_str} in ???"),
        Some(loc) if loc.function == "???" => format!("#{n} {addr_str} in ???"),
        Some(loc) if loc.has_line_info() => {
            let func = colorize(&loc.function, GREEN);
            let source = loc.source_file.as_ref().expect("has_line_info checked");
            format!("#{n} {addr_str} in {func} at {}:{}", source.display(), loc.line)
        }
        Some(loc) => {
            let func = colorize(&loc.function, GREEN);
            format!("#{n} {addr_str} in {func} from {}", loc.object_path)
        }
    }
}

fn print_frames(addrs: &[u64], locations: &HashMap<u64, Location>) {
    for (n, &addr) in addrs.iter().enumerate() {
        println!("{}", render_frame(n, addr, locations.get(&addr)));
    }
}

/// One header + frame list per captured thread, in capture order.
pub fn per_thread(threads: &[Thread], locations: &HashMap<u64, Location>) {
    for thread in threads {
        let header = colorize(&format!("Thread {} ({})", thread.tid, thread.name), CYAN);
        println!("{header}");
        print_frames(&thread.addrs, locations);
    }
}

/// Groups threads with byte-identical `rendered_hex` keys, prints the
/// largest groups first, and renders each group's frames once (spec.md
/// §4.7 / §8: group sizes sum to the number of captured threads).
pub fn aggregated(threads: &[Thread], locations: &HashMap<u64, Location>) {
    let groups: HashMap<&str, Vec<&Thread>> = threads
        .iter()
        .map(|t| (t.rendered_hex.as_str(), t))
        .into_group_map();

    let mut groups: Vec<Vec<&Thread>> = groups.into_values().collect();
    groups.sort_unstable_by_key(|g| std::cmp::Reverse(g.len()));

    for group in groups {
        let members = group
            .iter()
            .map(|t| format!("{}-{}", t.tid, t.name))
            .collect::<Vec<_>>()
            .join(", ");
        let header = colorize(&format!("Threads ({members})"), CYAN);
        println!("{header}");

        let representative = group.first().expect("a group always has at least one member");
        print_frames(&representative.addrs, locations);
    }
}

/// `--no_parse`: no symbol or line lookups at all. Addresses that fall
/// inside the main executable's mapped range are rewritten to their
/// file-relative offset; everything else (shared libraries) is left as an
/// absolute address, matching the historical tool's PIE-aware raw dump.
pub fn no_parse(threads: &[Thread], objects: &[ObjectFile], pt_loads: &[PTLoad]) {
    for thread in threads {
        println!("{} {}", thread.tid, thread.name);
        let rendered: Vec<String> = thread
            .addrs
            .iter()
            .map(|&addr| match main_exe_relative(objects, pt_loads, addr) {
                Some(offset) => format!("{offset:#x}"),
                None => format!("{addr:#x}"),
            })
            .collect();
        println!("{}", rendered.join(" "));
    }
}

fn main_exe_relative(objects: &[ObjectFile], pt_loads: &[PTLoad], addr: u64) -> Option<u64> {
    let pt = pt_loads.iter().find(|p| p.is_main_exe && addr >= p.start && addr < p.end)?;
    let object = &objects[pt.object_index];
    Some(pt.to_file_relative(object, addr))
}
