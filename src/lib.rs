//! Learns how to read a bank or card statement layout from one sample file and parses later
//! files of the same layout into transactions.
//!
//! The engine is made of pure pieces (`classify`, `extract`, `matcher`, `parser`) and two
//! boundaries: the SQLite template store in `db` and the external PDF collaborator in `pdf`.
//! `session` drives the human-in-the-loop learning workflow that ties them together.

pub mod args;
mod classify;
pub mod commands;
mod config;
mod db;
mod error;
pub mod extract;
mod institution;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod pdf;
pub mod reader;
pub mod session;
mod utils;


pub use classify::{classify, dominant_type};
pub use config::{Config, PdfSettings};
pub use db::TemplateStore;
pub use error::Error;
pub use error::Result;
