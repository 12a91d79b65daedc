use crate::target::object::ObjectFile;

/// Finds the nearest enclosing function symbol for a file-relative offset.
///
/// Binary-searches for the largest entry whose `addr <= offset`. There is no
/// upper-bound check against the next symbol (or the `.text` extent): an
/// address past the last known symbol is attributed to that symbol, matching
/// the behavior of ordinary address-to-symbol tools.
pub fn resolve(object: &ObjectFile, offset: u64) -> String {
    match object.symbols.partition_point(|s| s.addr <= offset) {
        0 => "???".to_string(),
        n => object.symbols[n - 1].name.clone(),
    }
}

/// Demangles a raw symbol name, keeping the original when demangling yields
/// nothing. Idempotent: demangling an already-demangled name returns it
/// unchanged.
pub fn demangle(raw: &str) -> String {
    let demangled = rustc_demangle::demangle(raw).to_string();
    if demangled.is_empty() {
        raw.to_string()
    } else {
        demangled
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::target::object::SymbolEntry;
    use std::path::PathBuf;

    fn object_with(symbols: &[(u64, &str)]) -> ObjectFile {
        ObjectFile {
            path: PathBuf::from("/bin/x"),
            debuginfo_path: PathBuf::from("/bin/x"),
            preferred_load_vaddr: 0,
            symbols: symbols
                .iter()
                .map(|(addr, name)| SymbolEntry {
                    addr: *addr,
                    name: name.to_string(),
                })
                .collect(),
            text_vma: 0,
            text_size: 0,
        }
    }

    #[test]
    fn resolves_to_nearest_enclosing_symbol() {
        let obj = object_with(&[(0x10, "foo"), (0x20, "bar"), (0x30, "baz")]);
        assert_eq!(resolve(&obj, 0x25), "bar");
    }

    #[test]
    fn exact_match_resolves_to_that_symbol_not_the_previous_one() {
        let obj = object_with(&[(0x10, "foo"), (0x20, "bar")]);
        assert_eq!(resolve(&obj, 0x20), "bar");
    }

    #[test]
    fn address_before_first_symbol_is_unresolved() {
        let obj = object_with(&[(0x10, "foo")]);
        assert_eq!(resolve(&obj, 0x5), "???");
    }

    #[test]
    fn address_past_last_symbol_is_attributed_to_it() {
        let obj = object_with(&[(0x10, "foo"), (0x20, "bar")]);
        assert_eq!(resolve(&obj, 0xffff), "bar");
    }

    #[test]
    fn empty_symbol_table_is_always_unresolved() {
        let obj = object_with(&[]);
        assert_eq!(resolve(&obj, 0x20), "???");
    }

    #[test]
    fn demangling_is_idempotent() {
        let once = demangle("_ZN3foo3barE");
        let twice = demangle(&once);
        assert_eq!(once, twice);
    }
}
