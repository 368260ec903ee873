pub mod delivery;
pub mod message_queue;

pub use delivery::{deliver, DeliveryReport};
pub use message_queue::NotificationQueue;
