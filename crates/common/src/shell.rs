//! A quiet/verbose gate for the handful of human-facing messages the CLI prints outside of
//! `tracing` (startup banner, final sync status). Structured diagnostics always go through
//! `tracing`; this only gates the small amount of output meant to be read directly by an
//! operator watching a terminal.

use std::sync::{Mutex, OnceLock};

/// How much of the gated output should reach stdout/stderr.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Shell {
    verbosity: Verbosity,
}

impl Shell {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }
}

fn global_shell() -> &'static Mutex<Shell> {
    static SHELL: OnceLock<Mutex<Shell>> = OnceLock::new();
    SHELL.get_or_init(|| Mutex::new(Shell::default()))
}

/// Installs the process-wide shell. Call once, at startup, before any `sh_*!` use.
pub fn set_shell(shell: Shell) {
    *global_shell().lock().expect("shell mutex poisoned") = shell;
}

pub fn get_shell() -> Shell {
    *global_shell().lock().expect("shell mutex poisoned")
}

/// Prints to stdout unless the shell is `Quiet`.
#[macro_export]
macro_rules! sh_println {
    ($($arg:tt)*) => {{
        if $crate::shell::get_shell().verbosity() != $crate::shell::Verbosity::Quiet {
            println!($($arg)*);
        }
    }};
}

/// Prints to stdout only when the shell is `Verbose`.
#[macro_export]
macro_rules! sh_verbose {
    ($($arg:tt)*) => {{
        if $crate::shell::get_shell().verbosity() == $crate::shell::Verbosity::Verbose {
            println!($($arg)*);
        }
    }};
}

/// Prints to stderr regardless of verbosity, and mirrors the message into `tracing` at `warn`
/// level so it still reaches a log aggregator when stderr isn't watched directly.
#[macro_export]
macro_rules! sh_eprintln {
    ($($arg:tt)*) => {{
        eprintln!($($arg)*);
        tracing::warn!($($arg)*);
    }};
}
