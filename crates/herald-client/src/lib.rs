#[cfg(feature = "browser")]
pub mod browser;
pub mod http;

#[cfg(feature = "browser")]
pub use browser::{ChromiumLauncher, ChromiumPage, LaunchOptions};
pub use http::ReqwestHttpClient;
