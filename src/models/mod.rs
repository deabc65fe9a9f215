// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod history;
pub mod location;
pub mod run;

pub use history::{RingBuffer, RunHistory, HISTORY_CAPACITY};
pub use location::LocationFix;
pub use run::{Alert, RunResult};
