//! Commands run by the CLI. Each one loads the instance state, drives the instance and writes
//! the state back.
pub mod create;
pub mod destroy;

use thiserror::Error;

use crate::driver::DriverError;
use crate::state::StateError;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}
