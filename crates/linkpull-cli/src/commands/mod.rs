mod activities;
mod channel_users;
mod chats;
mod discard;
mod extract;
mod init;
mod list;
mod members;
mod messages;
mod report;
mod status;

pub use activities::{cmd_activities, ActivityWindow};
pub use channel_users::cmd_channel_users;
pub use chats::cmd_chats;
pub use discard::cmd_discard;
pub use extract::cmd_extract;
pub use init::cmd_init;
pub use list::cmd_list;
pub use members::cmd_members;
pub use messages::{cmd_messages, MessageQuery};
pub use report::cmd_report;
pub use status::cmd_status;
