pub mod claim;
pub mod config;
pub mod content;
pub mod evidence;
pub mod progress;
pub mod request;
pub mod result;
