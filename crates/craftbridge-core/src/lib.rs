//! # craftbridge-core
//!
//! Core types shared by every craftbridge crate:
//! - The bridge-wide error type
//! - Parsed chat-room events and their display rendering
//! - The log-line parser that turns raw server output into events

pub mod error;
pub mod event;
pub mod parser;

pub use error::{BridgeError, Result};
pub use event::{AdvancementKind, ParsedEvent};
pub use parser::{LineParser, PatternRule};
