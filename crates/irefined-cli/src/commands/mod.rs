pub mod config;
pub mod feed;
pub mod guard;
pub mod queue;
pub mod run;
