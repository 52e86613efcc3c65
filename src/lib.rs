pub mod backend;
pub mod cache;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod git;
pub mod gitattr;
pub mod metadata;
pub mod model;
pub mod roll;
pub mod universe;

mod api;
mod flock;

pub use api::{RecipeFetch, RecipeFetchBuilder};
pub use cancel::Cancellation;
pub use config::RecipeFetchConfig;
