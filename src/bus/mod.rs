//! The delivery engine: topic lifecycle, per-topic delivery worker, replay
//! buffer, subscriber connection abstraction, and the dispatcher that ties a
//! connection to all three.

pub mod dispatcher;
pub mod error;
pub mod message;
pub mod metrics;
pub mod ring_buffer;
pub mod schema;
pub mod subscriber;
pub mod topic;
pub mod topic_manager;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use error::BusError;
pub use message::Message;
pub use metrics::MetricsRegistry;
pub use ring_buffer::RingBuffer;
pub use subscriber::{BatchSink, Subscriber};
pub use topic::{Topic, TopicState};
pub use topic_manager::TopicManager;
