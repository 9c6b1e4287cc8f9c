pub mod http;

pub use http::{
    ActionResponse, BlockRequest, CreateGroupRequest, CreateGroupResponse, ReadMessagesQuery,
    ReadMessagesResponse, ReadSource, RegisterRequest, RegisterResponse, SendDirectRequest,
    SendGroupRequest, SendResponse, UpdateGroupRequest,
};
