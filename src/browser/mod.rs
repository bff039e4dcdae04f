pub mod chrome;
pub mod hooks;
pub mod page;

pub use chrome::{ChromeDriver, LaunchOptions};
pub use page::{BrowserEvent, PageHandle, RawAction, RawElement, EVENT_CHANNEL_CAPACITY};
