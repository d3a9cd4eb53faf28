//! Capability toolkits beyond plain file access.

pub mod shell;

pub use shell::{shell_toolkit, ShellConfig};
