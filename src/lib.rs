//! # class-search
//!
//! Structural indexing and concurrent searching of compiled Java classes.
//!
//! ## Architecture
//!
//! - **classfile**: Class-file decoding (constant pool, attributes, bytecode) and the structural event stream
//! - **class_record**: Immutable class model with enclosing-class reconstruction and identity hashing
//! - **members**: Field, method and inner-class value records
//! - **matcher**: Text, number, reference and declaration matchers and the `Search` builder
//! - **query**: One-shot visitors applying a search to one class or file
//! - **result**: Totally ordered search results
//! - **engine**: Thread-pool fan-out with exactly-once completion and per-unit failure isolation
//! - **workspace**: Loading classes and resources from jars, directories and class files
//! - **config**: Settings resolved from flags, environment and config file

pub mod class_record;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod members;
pub mod query;
pub mod result;
pub mod workspace;
