//! tradeflow-runtime: the browser seams of `tradeflow` over W3C WebDriver.
//!
//! The browser itself is started out of band (`chromedriver`, `geckodriver`
//! or a Selenium grid); this crate only speaks HTTP to it.
//!
//! ```text
//! ┌──────────────┐
//! │  tradeflow   │  BrowserLauncher / Browser / BrowserContext / Page
//! └──────┬───────┘
//!        │ implemented by
//! ┌──────▼───────┐
//! │   runtime    │  This crate
//! │  ┌────────┐  │
//! │  │ Page   │  │  selectors, waits, input
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │Session │  │  /session/{id}/... commands
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Conn   │  │  reqwest + {"value": ...} envelopes
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod browser;
pub mod connection;
pub mod error;
pub mod page;

pub use browser::{DEFAULT_ENDPOINT, WebDriverBrowser, WebDriverContext, WebDriverLauncher};
pub use connection::{Connection, Session};
pub use error::{Error, Result};
pub use page::WebDriverPage;
pub use tradeflow_protocol::webdriver::BrowserKind;
