use thiserror::Error;

use crate::protocol::http::{
    BlockRequest, CreateGroupRequest, RegisterRequest, SendDirectRequest, SendGroupRequest,
    UpdateGroupRequest,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty field {0}")]
    Empty(&'static str),
    #[error("field {field} longer than {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("malformed timestamp {0:?}")]
    Timestamp(String),
    #[error("malformed request: {0}")]
    Malformed(String),
}

/// Size limits applied at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_text_len: usize,
    pub max_name_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        // text and names are VARCHAR(255) sized
        Self {
            max_text_len: 255,
            max_name_len: 255,
        }
    }
}

pub fn validate_id(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }
    Ok(())
}

fn validate_bounded(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

pub fn validate_text(text: &str, limits: &Limits) -> Result<(), ValidationError> {
    validate_bounded("text", text, limits.max_text_len)
}

pub fn validate_send_direct(
    req: &SendDirectRequest,
    limits: &Limits,
) -> Result<(), ValidationError> {
    validate_id("sender_id", &req.sender_id)?;
    validate_id("recipient_id", &req.recipient_id)?;
    validate_text(&req.text, limits)
}

pub fn validate_send_group(req: &SendGroupRequest, limits: &Limits) -> Result<(), ValidationError> {
    validate_id("sender_id", &req.sender_id)?;
    validate_id("group_id", &req.group_id)?;
    validate_text(&req.text, limits)
}

pub fn validate_register(req: &RegisterRequest, limits: &Limits) -> Result<(), ValidationError> {
    validate_bounded("username", &req.username, limits.max_name_len)
}

pub fn validate_create_group(
    req: &CreateGroupRequest,
    limits: &Limits,
) -> Result<(), ValidationError> {
    validate_bounded("group_name", &req.name, limits.max_name_len)
}

pub fn validate_update_group(req: &UpdateGroupRequest) -> Result<(), ValidationError> {
    validate_id("group_id", &req.group_id)?;
    validate_id("user_id", &req.user_id)
}

pub fn validate_block(req: &BlockRequest) -> Result<(), ValidationError> {
    validate_id("blocking_user_id", &req.blocking_user_id)?;
    validate_id("blocked_user_id", &req.blocked_user_id)
}
