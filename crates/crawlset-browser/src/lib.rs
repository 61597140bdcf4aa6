//! Chrome DevTools Protocol backend for crawlset.
//!
//! ```text
//! ┌─────────────────┐    WebSocket     ┌──────────────────┐
//! │  crawlset-core  │ ◄──────────────► │  Chrome/Chromium │
//! │  (PageDriver)   │       CDP        │ (persistent      │
//! └─────────────────┘                  │  profile)        │
//!                                      └──────────────────┘
//! ```
//!
//! [`ChromeBrowser`] connects to Chrome on its remote debugging port,
//! launching it with a persistent profile directory when nothing is
//! listening, so logins survive between runs. Every page it opens is a
//! [`CdpPage`] implementing the core's driver boundary.

pub mod cdp;
mod chrome;
mod page;
mod scripts;

pub use cdp::{CdpClient, CdpError, PageSession};
pub use chrome::{find_chrome, ChromeBrowser, ChromeConfig, CHROME_PATH_ENV};
pub use page::CdpPage;
