//! The tracing driver (§4.6): thread enumeration, the fork/attach/unwind/
//! detach protocol, and the shared-memory transport between parent and
//! child.

pub mod child;
pub mod driver;
pub mod shared;
