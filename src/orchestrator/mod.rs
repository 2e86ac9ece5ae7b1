//! Application-level orchestration utilities.
//!
//! This module owns session lifecycle control (submit/cancel/resubmit) and post-session
//! processing such as auto-save, exports, and history refresh. UI layers call into this
//! module to keep responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, SessionLauncher, UiCommand};
pub(crate) use post_process::process_session_completion;
