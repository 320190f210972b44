//! Shared domain model for the inventory graph core: nodes, edges, named
//! graphs, content hashing and the storage-driver-facing event/change types.
//!
//! Everything that a storage driver, the query translator and the command
//! pipeline all need to agree on lives here, the same way `graph::components`
//! and `graph::data` form the shared vocabulary beneath `graph-graphql` and
//! `graph-store-postgres`.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate serde_derive;

pub mod components;
pub mod data;
pub mod prelude;
pub mod util;

pub use crate::prelude::*;
