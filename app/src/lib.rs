//! Account balance service.
//!
//! A console front end over an event-sourced account stream. Commands append
//! events; a checkpointed projection folds them into the displayed balance.

pub mod bootstrap;
pub mod command;
pub mod config;
pub mod controller;
pub mod gateway;
pub mod view;

pub use bootstrap::{App, AppError};
pub use config::Config;
pub use controller::{Controller, Flow};
pub use gateway::{CommandError, CommandGateway};
