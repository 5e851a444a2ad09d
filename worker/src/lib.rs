pub mod compile;
pub mod config;
pub mod download;
pub mod fetch;
pub mod pack;
pub mod pipeline;
pub mod proc;
pub mod workspace;
