//! Imperative shell around `taskdeck-core`: HTTP backend, poll loop,
//! operator input and presentation.

pub mod app;
pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod input;
pub mod present;
pub mod scheduler;
