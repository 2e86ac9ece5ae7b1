//! Terminal client for an RBI (research, backtest, implement) job backend.
//!
//! The [`engine`] submits a list of strategy links, plays the cosmetic phase animation
//! and polls for per-link results; presentation layers fold its [`model::JobEvent`]
//! stream into a [`board::SessionView`].

pub mod board;
pub mod cli;
pub mod download;
pub mod engine;
pub mod error;
pub mod html;
pub mod logging;
pub mod model;
#[cfg_attr(not(feature = "tui"), allow(dead_code))]
pub(crate) mod orchestrator;
pub mod storage;
pub mod text_summary;
#[cfg(feature = "tui")]
mod tui;
