pub mod browser;
pub mod cleaner;
pub mod display;
pub mod parse;
pub mod transport;

pub use browser::{BrowserSession, BrowserSessionFactory, SessionConfig};
pub use cleaner::HtmdCleaner;
pub use display::VirtualDisplay;
pub use transport::HttpAnalysisTransport;
