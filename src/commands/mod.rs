pub mod config;
pub mod context;
pub mod exec;
pub mod run;
pub mod utils;

#[cfg(test)]
#[path = "../commands_test.rs"]
mod commands_test;
