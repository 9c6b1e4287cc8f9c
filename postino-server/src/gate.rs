use std::sync::Arc;

use crate::directory::Directory;
use crate::error::ServiceError;

/// Block check in front of direct sends.
pub struct AccessGate {
    directory: Arc<dyn Directory>,
}

impl AccessGate {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// False when `recipient_id` has blocked `sender_id`. A failed lookup is
    /// returned as an error, never read as "allowed".
    pub async fn can_send_direct(
        &self,
        sender_id: &str,
        recipient_id: &str,
    ) -> Result<bool, ServiceError> {
        let blocked = self.directory.is_blocked(recipient_id, sender_id).await?;
        Ok(!blocked)
    }
}
