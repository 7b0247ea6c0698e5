//! Messaging service adapters

pub mod gateway;
pub mod console;
