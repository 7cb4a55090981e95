// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod challenge;
pub mod clock;
pub mod config;
pub mod direction;
pub mod engine;
pub mod ledger;
pub mod outcome;
pub mod runtime;
pub mod scheduler;
pub mod util;
