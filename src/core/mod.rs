pub mod error;
pub mod listener;
pub mod message;
pub mod queue;
pub mod subscription;

pub use error::SubscribeError;
pub use listener::{listen, listen_with, Listener};
pub use message::Notification;
pub use queue::{delivery_queue, OverflowPolicy, QueueConsumer, QueueProducer};
pub use subscription::{
    spawn_worker, Subscription, SubscriptionOptions, SubscriptionState, WorkerHandle,
};
