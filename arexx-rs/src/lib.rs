pub mod bbs;
pub mod cli;
pub mod config;
pub mod repo;
pub mod script;
pub mod trigger;
