//! Graph access, the merge engine, and a storage-driver reference
//! implementation: everything a concrete backend needs to plug into to make
//! the merge algorithm and the query translator's output executable.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate lazy_static;

pub mod access;
pub mod driver;
pub mod merge;
