//! Threshold alerting over samples and health-check outcomes.
//!
//! [`rule::AlertRule`]s select samples by category, name and scope (the
//! `project` tag, or `system`) or health outcomes by check name, and
//! compare the value against a threshold. The [`engine::AlertEngine`]
//! keeps at most one open alert per (rule, scope) key and handles repeat
//! notification, escalation, suppression, acknowledgement and
//! auto-resolution, dispatching through `pmon-notify` channels.

pub mod engine;
pub mod error;
pub mod rule;
pub mod window;


pub use engine::{AlertEngine, AlertSettings};
pub use rule::{AlertRule, AlertRuleConfig, CompareOp, RuleCategory};
