//! Small shared utilities with no home of their own: the operator-facing output gate and
//! hex-formatting helpers used by `tracing` fields across the workspace.

pub mod hex_fmt;
pub mod shell;

pub use hex_fmt::short_hex;
pub use shell::{get_shell, set_shell, Shell, Verbosity};
