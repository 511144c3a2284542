//! Neo4j graph store over the transactional HTTP endpoint

mod client;

pub use client::{DEFAULT_DATABASE, HttpSession, HttpStore};
