//! Shared library for the seat-desk edge server and client shell: wire types,
//! configuration, and the access-control core.

pub mod access;
pub mod config;
pub mod types;
