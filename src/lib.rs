// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod error;
pub mod frequency;
pub mod priority;
pub mod scheduler;
pub mod selection;
pub mod service;
pub mod store;
pub mod util;
