pub mod client;

pub use client::{HttpNotificationApi, NotificationApi};
#[cfg(test)]
pub use client::MockNotificationApi;
