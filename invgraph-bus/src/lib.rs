//! Process-wide message bus, subscriber persistence, the durable worker task
//! queue, and the job/workflow coordinator that drives them, grounded on
//! `original_source/keepercore/core/event_bus.py` and the `jobs`/`add_job`
//! command surface of `ckcore/core/cli/command.py`.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate lazy_static;

pub mod channel;
pub mod config;
pub mod events;
pub mod subscription;
pub mod tasks;
pub mod workflow;

pub use config::Config;
