pub mod backend;
pub mod cache;
pub mod command;
