//! Scenario-based tests for the integration pipeline

mod mock_operations;

mod dependency_gate;
mod failure_handling;
mod teardown_order;
