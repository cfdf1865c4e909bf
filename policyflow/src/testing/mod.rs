//! Testing utilities for policy compositions.
//!
//! This module provides:
//! - Scripted operations with a fixed sequence of outcomes
//! - Gated operations for holding calls in flight during race tests
//! - Delayed operations for timeout and cancellation tests

mod mocks;

pub use mocks::{DelayedOperation, GatedOperation, ScriptedOperation};
