#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::doc_markdown,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::manual_let_else,
    clippy::map_unwrap_or,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self
)]

//! Multi-channel chat gateway core: conversation segmentation and the
//! tool-calling turn orchestrator, with the session/conversation data
//! model, store seam, and channel plumbing around them.

pub mod agent;
pub mod channels;
pub mod classify;
pub mod config;
pub mod error;
pub mod gate;
pub mod model;
pub mod pricing;
pub mod providers;
pub mod segmentation;
pub mod store;
pub mod tools;

pub use config::Config;
pub use error::TurnError;
