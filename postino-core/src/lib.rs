//! postino-core: types shared between the server and its clients (models,
//! HTTP DTOs, validation, wire errors). No I/O lives here.

pub mod error;
pub mod models;
pub mod protocol;
pub mod utils;
pub mod validation;

// Re-exports so the server crate can keep its paths short
pub use error::Error;
pub use models::{ChannelKind, Group, Message, MessageSummary, NewMessage, User};
pub use protocol::http::{
    ActionResponse, BlockRequest, CreateGroupRequest, CreateGroupResponse, ReadMessagesQuery,
    ReadMessagesResponse, ReadSource, RegisterRequest, RegisterResponse, SendDirectRequest,
    SendGroupRequest, SendResponse, UpdateGroupRequest,
};
pub use utils::{new_id, now_timestamp, parse_timestamp};
pub use validation::{Limits, ValidationError};
