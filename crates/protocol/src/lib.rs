//! Wire types shared by the tradeflow crates.
//!
//! Two shapes live here:
//!
//! - [`storage`]: the persisted browser storage state (cookies + localStorage),
//!   byte-compatible with Playwright's `storageState` JSON so session files can
//!   be exchanged with other tooling.
//! - [`webdriver`]: request/response envelopes of the W3C WebDriver protocol
//!   used by the runtime crate.
//!
//! Types in this crate are pure data. Behavior beyond conversions and file
//! helpers belongs in `tradeflow` or `tradeflow-runtime`.

pub mod storage;
pub mod webdriver;

pub use storage::*;
pub use webdriver::BrowserKind;
