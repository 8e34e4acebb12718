pub mod activity_log;
pub mod user;

pub use activity_log::{ActivityLog, ActivityStatus, NewActivity};
pub use user::{UsageCounter, User};
