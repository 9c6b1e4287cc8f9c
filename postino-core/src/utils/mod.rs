pub mod ids;
pub mod time;

pub use self::ids::new_id;
pub use self::time::{from_unix_micros, now_timestamp, parse_timestamp, to_unix_micros, truncate_to_micros};
