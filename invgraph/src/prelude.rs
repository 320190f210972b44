//! Re-exports commonly needed across the workspace, mirroring the way the
//! teacher's `graph::prelude` gives every downstream crate a single `use
//! crate::prelude::*;` to pull in `Logger`, `Error`, `format_err!`, etc.

pub use failure::{bail, format_err, Error, Fail};
pub use slog::{crit, debug, error, info, o, trace, warn, Logger};

pub use crate::components::store::{
    ChangeCounts, GraphEvent, GraphEventOperation, GraphEventStream, Store, StoreError,
};
pub use crate::data::edge::{Edge, EdgeType};
pub use crate::data::graph::GraphName;
pub use crate::data::node::{Node, NodeId, Section};
pub use crate::util::content_hash;
