pub mod layout;
pub mod messages;
pub mod stream;

pub use layout::Layout;
pub use messages::{
    AppSetting, CloudToGlassesMessage, CloudToTpaMessage, GlassesMessage, TpaMessage,
    TranscriptionData, UserSessionSnapshot, VadStatus,
};
pub use stream::{ParseStreamKeyError, StreamKey};
