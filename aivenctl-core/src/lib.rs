//! aivenctl core
//!
//! Resource model, schemas and planning shared by the Aiven provider and the CLI.
//! Side effects are represented as values (Effects) and only executed by the
//! Interpreter.

pub mod config;
pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
