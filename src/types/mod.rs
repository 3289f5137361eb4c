//! Core type definitions for glasshouse.
//!
//! This module contains the domain types shared across the crate:
//! - Identity types (ExecutionId)
//! - Wire types (ExecutionRequest, ExecutionResult, InputFile, WireFile, ErrorInfo)

mod execution_id;
mod wire;

pub use execution_id::{ExecutionId, InvalidExecutionId};
pub use wire::{ErrorInfo, ExecutionRequest, ExecutionResult, InputFile, WireFile};
