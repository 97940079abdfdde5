//! Transport-agnostic connection abstraction.
//!
//! §1/§6 put wire framing out of scope for the core: only the message
//! schema matters. The dispatcher only ever holds a reader half and a
//! shared writer half, split up front, so the topic worker's concurrent
//! fan-out can push `event` frames through the writer while the dispatcher's
//! receive loop independently awaits the next client frame on the reader.

use std::sync::Arc;

use async_trait::async_trait;

use super::schema::{ClientMessage, ServerMessage};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("decode error: {0}")]
    Decode(String),
    #[error("transport error: {0}")]
    Other(String),
}

#[async_trait]
pub trait ConnectionReader: Send {
    /// Waits for and decodes the next client frame. `Err(TransportError::Decode)`
    /// is recoverable (the dispatcher replies with an error frame and keeps
    /// going); any other error is treated as a fatal transport failure.
    async fn recv(&mut self) -> Result<ClientMessage, TransportError>;
}

#[async_trait]
pub trait ConnectionWriter: Send + Sync {
    async fn send(&self, msg: ServerMessage) -> Result<(), TransportError>;
}

/// A connection before it is split into independently-owned halves.
pub trait Connection: Send {
    fn split(self: Box<Self>) -> (Box<dyn ConnectionReader>, Arc<dyn ConnectionWriter>);
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex as AsyncMutex;

    /// In-memory connection double: `inbox` is fed by the test, `outbox`
    /// collects everything the dispatcher sent back.
    pub struct MockConnection {
        inbox: AsyncMutex<VecDeque<Result<ClientMessage, TransportError>>>,
        outbox: Arc<AsyncMutex<Vec<ServerMessage>>>,
    }

    impl MockConnection {
        pub fn new(frames: Vec<ClientMessage>) -> Self {
            Self {
                inbox: AsyncMutex::new(frames.into_iter().map(Ok).collect()),
                outbox: Arc::new(AsyncMutex::new(Vec::new())),
            }
        }

        /// A handle to the outbox, kept by the caller before `split()`
        /// consumes `self`, so frames sent during `Dispatcher::run` can be
        /// inspected afterwards.
        pub fn outbox_handle(&self) -> Arc<AsyncMutex<Vec<ServerMessage>>> {
            self.outbox.clone()
        }
    }

    pub struct MockReader {
        inbox: AsyncMutex<VecDeque<Result<ClientMessage, TransportError>>>,
    }

    #[async_trait]
    impl ConnectionReader for MockReader {
        async fn recv(&mut self) -> Result<ClientMessage, TransportError> {
            self.inbox.get_mut().pop_front().unwrap_or(Err(TransportError::Closed))
        }
    }

    pub struct MockWriter {
        pub outbox: Arc<AsyncMutex<Vec<ServerMessage>>>,
    }

    #[async_trait]
    impl ConnectionWriter for MockWriter {
        async fn send(&self, msg: ServerMessage) -> Result<(), TransportError> {
            self.outbox.lock().await.push(msg);
            Ok(())
        }
    }

    impl Connection for MockConnection {
        fn split(self: Box<Self>) -> (Box<dyn ConnectionReader>, Arc<dyn ConnectionWriter>) {
            let reader = Box::new(MockReader { inbox: self.inbox });
            let writer = Arc::new(MockWriter {
                outbox: self.outbox.clone(),
            });
            (reader, writer)
        }
    }

    impl MockConnection {
        pub async fn take_outbox(outbox: &Arc<AsyncMutex<Vec<ServerMessage>>>) -> Vec<ServerMessage> {
            outbox.lock().await.clone()
        }
    }
}
