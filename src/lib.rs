//! Library surface for the SQL tutor terminal client.
//!
//! The interesting pieces are [`session::SessionController`] (which mode is
//! active, which question is open, what free-text input means right now) and
//! [`explain::run`] (chunked explain stream consumption with a single
//! formatted re-render at the end). Everything else is glue around them:
//! the HTTP client, config loading, and the REPL.

pub mod api;
pub mod config;
pub mod error;
pub mod explain;
pub mod repl;
pub mod session;
