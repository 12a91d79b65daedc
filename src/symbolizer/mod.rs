//! Turns raw addresses into `(function, source file, line)` triples: a
//! symbol-table resolver, a fault-tolerant DWARF line resolver, and the
//! location cache that ties the two together.

pub mod cache;
pub mod dwarf;
pub mod fault;
pub mod symtab;
