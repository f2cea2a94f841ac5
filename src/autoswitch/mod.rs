//! Process-triggered automatic profile switching

pub mod resolver;
pub mod rules;
pub mod watcher;

#[cfg(windows)]
pub mod toolhelp;

pub use resolver::{AutoSwitchResolver, ProfileChangeRequired};
pub use rules::{dedup_rules, default_rules, normalize_process_key, reset_to_defaults, ProfileRule, RuleSet};
pub use watcher::{ProcessInfo, ProcessSource, ProcessWatcher};
