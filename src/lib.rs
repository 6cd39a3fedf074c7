//! Flow definition language: parser and async executor.
//!
//! A flow source declares external steps, an optional input map, and a
//! `main` block of statements. [`parser::parse_flow`] turns the source into
//! a [`types::FlowModel`]; [`executor::Executor`] interprets the model
//! against a [`executor::StepHandler`] implementation, tracking statement
//! status, variables, retries, and cancellation as it goes.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod flows;
pub mod init;
pub mod parser;
pub mod types;

pub use config::Config;
pub use error::{FlowError, Result};
pub use executor::{
    EchoHandler, Executor, FlowObserver, FlowRegistry, NullObserver, StepHandler, StepOutcome,
};
pub use flows::{FlowFile, FlowLibrary};
pub use init::{initialize, is_initialized, InitOptions};
pub use parser::parse_flow;
pub use types::{FlowModel, StatementKind, StatementStatus, StepDefinition, Val, VariableInfo};
