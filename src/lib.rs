//! School Power activity builder.
//!
//! Turns filled-in lesson forms into structured classroom activities: a prompt
//! per activity type, one call to the generative model, tolerant JSON
//! extraction, and a placeholder fallback whenever any of that fails. Built
//! activities land in a size-bounded store and every step is announced on an
//! event bus.
//!
//! Important env variables (read by the host binary):
//!   PORT                : u16 (default 3000)
//!   GEMINI_API_KEY      : enables generation; without it every build falls back
//!   GEMINI_BASE_URL     : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_MODEL        : default "gemini-1.5-flash"
//!   BUILDER_CONFIG_PATH : path to TOML config ([generation], [storage], [batch])
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

pub mod activities;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod fallback;
pub mod gemini;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod protocol;
pub mod retry;
pub mod routes;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;
