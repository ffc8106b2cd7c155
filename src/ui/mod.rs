//! Interactive front end.
//!
//! - **[`app`]**: UI state and the controller that starts background work.
//! - **[`queue`]**: worker-to-UI hand-off, drained once per frame.
//! - **[`worker`]**: blocking worker pool.
//! - **[`cancel`]**: supersession tickets and debounce.
//! - **[`tui`]**: ratatui rendering and key handling.

pub mod app;
pub mod cancel;
pub mod components;
pub mod queue;
pub mod shortcuts;
pub mod tui;
pub mod worker;
