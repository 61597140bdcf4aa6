//! CDP page session for interacting with a single page.

mod core;
mod navigation;
mod runtime;

pub use self::core::PageSession;

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
