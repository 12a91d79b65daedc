use nix::unistd::Pid;

/// Error kinds this crate can raise.
///
/// `is_fatal` tells a caller whether the whole run should stop (startup and
/// infrastructure failures) or whether the failure is expected during live
/// process tracing and the operation should simply move on to the next
/// thread or address.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("tool not initialized")]
    NotInit,
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("process {0} not found")]
    EntryNotExist(Pid),
    #[error("file not found: {0}")]
    FileNotExist(String),
    #[error("failed to open file {0}: {1}")]
    FileOpenError(String, std::io::Error),
    #[error("file is empty: {0}")]
    EmptyFile(String),
    #[error("readlink failed: {0}")]
    ReadlinkFailed(std::io::Error),
    #[error("failed to open directory: {0}")]
    OpenDirFailed(std::io::Error),
    #[error("failed to kill process: {0}")]
    KillFailed(nix::Error),
    #[error("operation timed out")]
    Timeout,
    #[error("unexpected error: {0}")]
    UnexpectedError(String),
    #[error("memory allocation failed")]
    AllocFailed,
    #[error("size overflow")]
    SizeOverflow,

    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("waitpid syscall error: {0}")]
    Waitpid(nix::Error),
    #[error("ptrace syscall error: {0}")]
    Ptrace(nix::Error),
    #[error("fork syscall error: {0}")]
    Fork(nix::Error),
    #[error("object file parsing error: {0}")]
    ObjParsing(#[from] object::Error),
    #[error("dwarf parsing error: {0}")]
    DwarfParsing(#[from] gimli::Error),
    #[error("unwind error: {0}")]
    Unwind(#[from] unwind::Error),
}

impl Error {
    /// Whether this error should terminate the whole run, as opposed to
    /// being logged and recovered from locally (per-thread, per-address).
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::NotInit => true,
            Error::InvalidArg(_) => true,
            Error::EntryNotExist(_) => true,
            Error::FileNotExist(_) => true,
            Error::FileOpenError(_, _) => true,
            Error::EmptyFile(_) => true,
            Error::ReadlinkFailed(_) => false,
            Error::OpenDirFailed(_) => true,
            Error::KillFailed(_) => false,
            Error::Timeout => false,
            Error::UnexpectedError(_) => true,
            Error::AllocFailed => true,
            Error::SizeOverflow => true,
            Error::IO(_) => false,
            Error::Waitpid(_) => true,
            Error::Ptrace(_) => false,
            Error::Fork(_) => true,
            Error::ObjParsing(_) => false,
            Error::DwarfParsing(_) => false,
            Error::Unwind(_) => false,
        }
    }

    /// Process exit status for a fatal error reaching the outermost
    /// handler. Usage errors exit 1 before an `Error` is ever constructed
    /// (argument parsing handles that itself); everything else is
    /// classified per spec.md §6's named exit conditions.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::EntryNotExist(_) => 2,
            Error::Fork(_) | Error::Waitpid(_) | Error::UnexpectedError(_) => 3,
            _ => 1,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "obstack", "{}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "obstack", concat!($msg, " {}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option`, logging the error at WARN if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option`, logging the error at DEBUG if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
