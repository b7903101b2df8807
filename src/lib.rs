//! Job orchestration for the Bakta web service: builds and submits
//! annotation workloads, tracks their status and repairs jobs whose
//! workloads disappeared.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod reconciler;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod spec_builder;
pub mod state_machine;
pub mod storage;
pub mod store;
pub mod tasks;

#[cfg(test)]
mod testing;
