//! The command pipeline: a small shell over the graph store, query engine
//! and task subsystem, grounded throughout on
//! `original_source/ckcore/core/cli/cli.py` and `command.py`.

#[macro_use]
extern crate failure;

pub mod commands;
pub mod context;
pub mod error;
pub mod fuse;
pub mod grammar;
pub mod interpret;
pub mod placeholders;
pub mod pipeline;
pub mod registry;
pub mod stream;

pub use context::{CliContext, CliDependencies};
pub use error::CliError;
pub use pipeline::{evaluate, execute};
pub use registry::CommandRegistry;
