use clap::{CommandFactory, Parser, ValueEnum};
use nix::unistd::Pid;

/// `obstack`: attach to every thread of a running process and print
/// symbolized backtraces, without keeping the target under a debugger.
#[derive(Parser, Debug)]
#[command(name = "obstack", version, disable_version_flag = true, disable_help_flag = true)]
struct Args {
    /// Log threshold.
    #[arg(short = 'l', long = "log_level", value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Suppress symbolization; print raw address lists.
    #[arg(short = 'n', long = "no_parse", action = clap::ArgAction::SetTrue)]
    no_parse: bool,

    /// Aggregate threads by identical stack.
    #[arg(short = 'a', long = "agg", action = clap::ArgAction::SetTrue)]
    agg: bool,

    /// Override symbol source for the main executable.
    #[arg(short = 's', long = "symbol_path")]
    symbol_path: Option<String>,

    /// Override DWARF source for the main executable.
    #[arg(short = 'd', long = "debuginfo_path")]
    debuginfo_path: Option<String>,

    /// Skip line-number resolution; keep function names only.
    #[arg(short = 'o', long = "no_lineno", action = clap::ArgAction::SetTrue)]
    no_lineno: bool,

    /// Only sample the main thread.
    #[arg(short = 't', long = "thread_only", action = clap::ArgAction::SetTrue)]
    thread_only: bool,

    /// Print version and exit.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    version: bool,

    /// Target process id.
    pid: Option<i32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// Immutable, write-once configuration, built from CLI arguments and passed
/// by value to every component rather than kept as a process-wide global.
#[derive(Debug, Clone)]
pub struct Config {
    pub pid: Pid,
    pub log_level: log::LevelFilter,
    pub no_parse: bool,
    pub agg: bool,
    pub symbol_path: Option<String>,
    pub debuginfo_path: Option<String>,
    pub no_lineno: bool,
    pub thread_only: bool,
}

impl Config {
    /// Parses `std::env::args`, handling `--version`/`--help` as immediate
    /// exits, and returns the resolved configuration.
    ///
    /// `--help`/`-?` exits 1 (not clap's usual 0) per spec.md §6, so it is
    /// intercepted before `Args::parse()` rather than left to clap's
    /// built-in help flag.
    pub fn from_args() -> Config {
        if std::env::args().skip(1).any(|a| a == "--help" || a == "-?") {
            let _ = Args::command().print_long_help();
            println!();
            std::process::exit(1);
        }

        let args = match Args::try_parse() {
            Ok(args) => args,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        };

        if args.version {
            println!("obstack {}", env!("CARGO_PKG_VERSION"));
            std::process::exit(0);
        }

        let pid = match args.pid {
            Some(pid) => Pid::from_raw(pid),
            None => {
                eprintln!("error: missing required argument <pid>");
                std::process::exit(1);
            }
        };

        Config {
            pid,
            log_level: args.log_level.into(),
            no_parse: args.no_parse,
            agg: args.agg,
            symbol_path: args.symbol_path,
            debuginfo_path: args.debuginfo_path,
            no_lineno: args.no_lineno,
            thread_only: args.thread_only,
        }
    }
}
