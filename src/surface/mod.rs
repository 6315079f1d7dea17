//! Page surfaces the engine can drive

pub mod static_html;
pub mod webdriver;

pub use static_html::{StaticElement, StaticSurface};
pub use webdriver::WebDriverSurface;
