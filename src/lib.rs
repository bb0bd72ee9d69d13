pub mod config;
pub mod db;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod models;
pub mod plugin;
pub mod record;
pub mod rules;
pub mod sanitizer;
pub mod scanner;

pub use hooks::{Event, Message, MessagePipeline};
pub use record::{CleanedUrls, UrlRecord};
pub use rules::{compile, MatcherSet, DEFAULT_RULES};
pub use sanitizer::RuleEngine;
pub use scanner::scan;
