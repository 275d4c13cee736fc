//! 浏览器层：驱动接口、Chrome / Mock 实现与页面摘要

#[cfg(feature = "browser")]
pub mod chrome;
pub mod driver;
pub mod mock;
pub mod summarizer;

#[cfg(feature = "browser")]
pub use chrome::ChromeDriver;
pub use driver::{BrowserDriver, DriverError, ScrollDirection};
pub use mock::{DriverCall, MockDriver};
pub use summarizer::{InteractiveElement, PageSnapshot, PageSummarizer, RawElement};
