pub mod browser;
pub mod capture;
pub mod charge;
pub mod config;
pub mod decoder;
pub mod digit_map;
pub mod locator;
pub mod ocr;
pub mod pin;
pub mod preprocess;
