//! Integration tests for rowbridge.

pub mod agent_test;
pub mod caller_test;
pub mod common;
