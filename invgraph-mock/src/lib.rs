//! Test doubles shared across the workspace: a `ChannelSession` stand-in for
//! the bidirectional wire protocol, and fixture builders for nodes, edges
//! and a pre-seeded store. Mirrors the role `graph-mock` plays for an
//! indexing pipeline, generalized from a block stream mock to the
//! collaborators this workspace actually has.

pub mod channel;
pub mod fixtures;

pub use channel::MockChannelSession;
pub use fixtures::{node, GraphFixture};
