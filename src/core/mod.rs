//! Core operator abstractions and types
//!
//! This module defines the record model, the operator and iterator traits,
//! and the parameter, constraint, metrics and registry plumbing every
//! operator builds on.

pub mod metrics;
pub mod constraint;
pub mod record;
pub mod parameter;
pub mod operator;
pub mod registry;

pub use operator::{
    drain, ExecError, ExecResult, ExecutionContext, IterAdapter, Operator, OperatorCategory,
    OperatorMetadata, RecordIterator, RecordStream,
};
pub use record::{DataType, Field, Record, RecordId, Schema, Value};
pub use registry::{JoinStrategy, OperatorRegistry, RegistryError};
