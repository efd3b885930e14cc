//! Library side of the `sip` command-line tool.

pub mod config;
pub mod logging;
pub mod pipeline;
