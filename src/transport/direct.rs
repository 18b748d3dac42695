//! In-process transport
//!
//! `send` hands the envelope straight to a [`MessageHandler`] and returns its
//! answer. Useful for tests and for embedding a server inside its host.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use tokio::sync::Mutex;

use crate::errors::Error;
use crate::transport::{ MessageHandler, Transport };

const DIRECT_CLIENT_ID: &str = "direct";

pub struct DirectTransport {
    handler: Arc<dyn MessageHandler>,
    running: AtomicBool,
    in_flight: Mutex<()>,
}

impl DirectTransport {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            handler,
            running: AtomicBool::new(false),
            in_flight: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn start(&self) -> Result<(), Error> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, message: &str) -> Result<Option<String>, Error> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(Error::Transport("Direct transport is not running".to_string()));
        }
        let _guard = self.in_flight.lock().await;
        self.handler.handle_message(DIRECT_CLIENT_ID, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle_message(&self, client_id: &str, message: &str) -> Result<Option<String>, Error> {
            Ok(Some(format!("{}:{}", client_id, message)))
        }
    }

    #[tokio::test]
    async fn test_send_requires_start() {
        let transport = DirectTransport::new(Arc::new(Echo));
        assert!(transport.send("hi").await.unwrap_err().is_transport());

        transport.start().await.unwrap();
        assert_eq!(transport.send("hi").await.unwrap().as_deref(), Some("direct:hi"));

        transport.stop().await.unwrap();
        assert!(transport.send("hi").await.is_err());
    }

    #[test]
    fn test_start_is_idempotent() {
        let transport = DirectTransport::new(Arc::new(Echo));
        tokio_test::assert_ok!(tokio_test::block_on(transport.start()));
        tokio_test::assert_ok!(tokio_test::block_on(transport.start()));
        let reply = tokio_test::block_on(transport.send("again"));
        assert_eq!(reply.unwrap(), Some("direct:again".to_string()));
    }
}
