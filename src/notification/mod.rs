//! Notification request and payload types.

mod types;

pub use types::{NotificationKind, NotificationRequest, RenderedPayload, RequestError};
