pub mod group;
pub mod message;
pub mod user;

pub use group::Group;
pub use message::{ChannelKind, Message, MessageSummary, NewMessage};
pub use user::User;
