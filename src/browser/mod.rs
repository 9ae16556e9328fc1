//! Browser driver: the `BrowserDriver` trait (§4.7, §6b) and a
//! `chromiumoxide`-backed implementation reusing the executable discovery,
//! stealth measures, and per-session profile machinery from
//! `browser_setup`/`browser_profile`.

pub mod chromium_driver;
pub mod cookies;
pub mod driver;

pub use chromium_driver::ChromiumBrowserDriver;
pub use cookies::CookieJar;
pub use driver::{BrowserContextHandle, BrowserDriver, ProxySettings, TabHandle};
