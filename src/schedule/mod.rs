pub mod codec;
pub mod days;
pub mod time;

pub use codec::{decode_rule, encode_rule, rule_summary, rules_summary, ScheduleRule};
pub use days::Day;
pub use time::{to_12h, to_24h};
