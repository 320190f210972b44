//! The declarative graph query language: its abstract syntax (`model`), its
//! parser (`parser`), and its lowering into a backend query (`translate`).

#[macro_use]
extern crate failure;
#[macro_use]
extern crate serde_derive;

pub mod model;
pub mod parser;
pub mod translate;

pub use model::*;
