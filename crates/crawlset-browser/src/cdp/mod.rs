//! Chrome DevTools Protocol (CDP) client.
//!
//! Connects to Chrome/Chromium over the browser-level WebSocket and attaches
//! one flattened session per page.
//!
//! ```rust,ignore
//! let client = CdpClient::connect("http://localhost:9222").await?;
//! let session = client.new_page(None).await?;
//! session.navigate("https://example.com", Duration::from_secs(30)).await?;
//! ```

mod client;
mod error;
mod protocol;
mod session;

pub use client::CdpClient;
pub use error::CdpError;
pub use protocol::*;
pub use session::PageSession;
