pub mod channel;
pub mod id;
pub mod protocol;

pub use channel::{ChannelError, PushChannel, PushKind};
pub use protocol::{Frame, Reason};
