//! Per-connection protocol handler.
//!
//! On accept: create a Subscriber, send the welcome `info` frame, then loop
//! decoding frames and translating them into TopicManager/Topic/Subscriber
//! calls until the connection fails or global shutdown is signalled.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;

use super::error::BusError;
use super::message::{Message, validate_payload_size};
use super::schema::{ClientMessage, ServerMessage};
use super::subscriber::{BatchSink, Subscriber};
use super::topic_manager::TopicManager;
use super::transport::{Connection, ConnectionWriter, TransportError};

/// Bridges a subscriber's batched delivery to the transport's one-frame-at-a-
/// time writer by translating each message into an `event` frame.
struct WriterSink(Arc<dyn ConnectionWriter>);

#[async_trait]
impl BatchSink for WriterSink {
    async fn send_batch(&self, batch: &[Arc<Message>]) -> bool {
        for msg in batch {
            let frame = ServerMessage::Event {
                topic: msg.topic.clone(),
                data: msg.payload.clone(),
                message_id: msg.id.clone(),
                ts: msg.ts,
            };
            if self.0.send(frame).await.is_err() {
                return false;
            }
        }
        true
    }

    async fn notify_closed(&self, reason: &str) {
        let _ = self
            .0
            .send(ServerMessage::Info {
                message: reason.to_string(),
            })
            .await;
    }
}

pub struct Dispatcher {
    manager: Arc<TopicManager>,
}

impl Dispatcher {
    pub fn new(manager: Arc<TopicManager>) -> Self {
        Self { manager }
    }

    /// Drives one connection to completion. Returns when the transport fails
    /// or `shutdown` fires; the subscriber is removed from every topic it
    /// joined before returning.
    pub async fn run(
        &self,
        connection: Box<dyn Connection>,
        client_id: String,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (mut reader, writer) = connection.split();
        let config = self.manager.config();
        let sink: Arc<dyn BatchSink> = Arc::new(WriterSink(writer.clone()));
        let subscriber = Arc::new(Subscriber::new(
            client_id.clone(),
            sink,
            config.send_deadline,
            config.rate_limit_rps,
            config.rate_limit_burst,
        ));

        let _ = writer
            .send(ServerMessage::Info {
                message: format!("connected as {client_id}"),
            })
            .await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    let _ = writer
                        .send(ServerMessage::error(&BusError::ShuttingDown))
                        .await;
                    break;
                }
                frame = reader.recv() => {
                    match frame {
                        Ok(msg) => self.handle_message(&subscriber, &writer, msg).await,
                        Err(TransportError::Decode(reason)) => {
                            let _ = writer
                                .send(ServerMessage::error(&BusError::InvalidJson(reason)))
                                .await;
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        subscriber.close();
        for topic_name in subscriber.joined_topics() {
            if let Some(topic) = self.manager.get(&topic_name) {
                topic.unsubscribe(&subscriber.client_id);
            }
        }
    }

    async fn handle_message(
        &self,
        subscriber: &Arc<Subscriber>,
        writer: &Arc<dyn ConnectionWriter>,
        msg: ClientMessage,
    ) {
        let config = self.manager.config();
        match msg {
            ClientMessage::Subscribe { topic, last_n } => {
                if last_n > config.max_last_n {
                    let max_last_n = config.max_last_n;
                    let err = BusError::ValidationError(format!("last_n must be <= {max_last_n}"));
                    let _ = writer.send(ServerMessage::error(&err)).await;
                    return;
                }
                match self.manager.get(&topic) {
                    None => {
                        let _ = writer
                            .send(ServerMessage::error(&BusError::TopicNotFound(topic)))
                            .await;
                    }
                    Some(t) => match t.subscribe(subscriber.clone(), last_n) {
                        Ok(replay) => {
                            subscriber.send_batch(&replay).await;
                            let _ = writer
                                .send(ServerMessage::ack("subscribe", Some(topic), "subscribed"))
                                .await;
                        }
                        Err(e) => {
                            let _ = writer.send(ServerMessage::error(&e)).await;
                        }
                    },
                }
            }
            ClientMessage::Unsubscribe { topic } => {
                if let Some(t) = self.manager.get(&topic) {
                    t.unsubscribe(&subscriber.client_id);
                }
                subscriber.left(&topic);
                let _ = writer
                    .send(ServerMessage::ack("unsubscribe", Some(topic), "unsubscribed"))
                    .await;
            }
            ClientMessage::Publish { topic, data } => {
                if let Err(e) = validate_payload_size(&data, config.max_payload_bytes) {
                    let _ = writer.send(ServerMessage::error(&e)).await;
                    return;
                }
                match subscriber.check_rate(Instant::now()) {
                    Err(retry_after_secs) => {
                        let _ = writer
                            .send(ServerMessage::error(&BusError::RateLimited { retry_after_secs }))
                            .await;
                    }
                    Ok(()) => match self.manager.get(&topic) {
                        None => {
                            let _ = writer
                                .send(ServerMessage::error(&BusError::TopicNotFound(topic)))
                                .await;
                        }
                        Some(t) => match t.publish(data) {
                            Ok(_) => {
                                let _ = writer
                                    .send(ServerMessage::ack("publish", Some(topic), "published"))
                                    .await;
                            }
                            Err(e) => {
                                let _ = writer.send(ServerMessage::error(&e)).await;
                            }
                        },
                    },
                }
            }
            ClientMessage::Ping => {
                let _ = writer.send(ServerMessage::Pong).await;
            }
        }
    }
}
