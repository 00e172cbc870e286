mod config;
mod git;
mod logging;
mod process;
mod provision;
mod pty;

pub use config::*;
pub use git::*;
pub use logging::*;
pub use process::*;
pub use provision::*;
pub use pty::*;

#[cfg(test)]
pub(crate) use process::testing;
