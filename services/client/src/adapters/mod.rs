//! services/client/src/adapters/mod.rs
//!
//! Concrete implementations of the `java_tutor_core` ports.

pub mod backend;
pub mod storage;
