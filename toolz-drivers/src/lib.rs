//! Driver layer for the isolated rendering sandbox.
//!
//! This crate wraps a WebDriver session that is used as an invisible,
//! script-capable surface: a document is written into it once, its
//! materialized text is probed while client scripts hydrate, and the
//! session is closed afterwards.
//!
//! - [`sandbox::driver::SandboxDriver`]: WebDriver client wrapper
//! - [`sandbox::launch`]: browser arguments and the scripts run inside the sandbox
pub mod sandbox;
