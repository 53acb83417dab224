//! Browser session capability for driving the portal.
//!
//! The monitor only needs a handful of page operations: open a URL, find an
//! element with a bounded wait, type, click, read the location, close. They
//! are expressed by the [`BrowserSession`] trait; sessions are created by a
//! [`BrowserLauncher`].
//!
//! - **`session`**: the traits, [`Locator`] predicates and element handles.
//! - **`webdriver`**: a W3C WebDriver client (chromedriver) implementing them.
//! - **`fake`** (feature `fake`): a scripted in-memory portal for tests.

pub mod error;
pub mod session;
pub mod webdriver;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use error::BrowserError;
pub use session::{BrowserLauncher, BrowserSession, ElementHandle, Locator};
pub use webdriver::{WebDriverLauncher, WebDriverSession};
