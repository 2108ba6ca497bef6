pub mod backup;
pub mod delete;
pub mod health;
pub mod schedule;

pub use backup::{create_backup, list_backups};
pub use delete::delete_backup;
pub use health::health_check;
pub use schedule::{delete_schedule, list_schedules, upsert_schedule};
