use uuid::Uuid;

/// Fresh random identifier (UUIDv4) for users, groups and messages.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
