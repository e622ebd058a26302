//! Pipeline stages for Markdown-to-PDF conversion.
//!
//! Each submodule implements exactly one step around the external converter.
//! Keeping stages separate makes each independently testable: the command
//! line can be checked without spawning anything, and the supervisor can be
//! driven by any executable.
//!
//! ## Data Flow
//!
//! ```text
//! staging ──▶ command ──▶ process
//! (text→.md)  (argv)      (spawn, register, supervise, reap)
//! ```
//!
//! 1. [`staging`]: write raw Markdown text to a temporary `.md` file, with a
//!    UTF-8 BOM for CJK documents (only used by the text entry point)
//! 2. [`command`]: translate [`crate::ConversionParams`] into the exact,
//!    deterministic `pandoc` argument vector
//! 3. [`process`]: launch the converter in its own process group, drain its
//!    output, enforce the timeout and deliver cancellation signals

pub mod command;
pub mod process;
pub mod staging;
