pub mod benchmark;
pub mod candidates;
pub mod harness;
pub mod run_store;
