//! Actor system utilities
//!
//! Foundational types for actor-backed storage proxies. Each proxy runs as a
//! long-lived async task that processes commands via a channel; the public
//! proxy type is a cheap-to-clone handle around the sender.

use std::fmt;

use tokio::sync::mpsc;

/// Trait for actor messages - all commands sent to actors must implement this
pub trait ActorMessage: Send + 'static {}

/// Generic actor handle that can send commands to an actor
pub struct ActorHandle<C: ActorMessage> {
    sender: mpsc::Sender<C>,
}

// Manual Clone implementation that doesn't require C: Clone
impl<C: ActorMessage> Clone for ActorHandle<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C: ActorMessage> ActorHandle<C> {
    /// Create a new actor handle from a sender
    pub fn new(sender: mpsc::Sender<C>) -> Self {
        Self { sender }
    }

    /// Send a command to the actor
    pub async fn send(&self, cmd: C) -> Result<(), ActorError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| ActorError::ChannelClosed)
    }

    /// Check if the actor is still alive (channel not closed)
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl<C: ActorMessage> fmt::Debug for ActorHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("is_alive", &self.is_alive())
            .finish()
    }
}

/// Spawn an actor task and return its handle
pub fn spawn_actor<C, F, Fut>(buffer_size: usize, actor_fn: F) -> ActorHandle<C>
where
    C: ActorMessage,
    F: FnOnce(mpsc::Receiver<C>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer_size);
    tokio::spawn(actor_fn(rx));
    ActorHandle::new(tx)
}

/// Errors that can occur in actor operations
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("actor channel closed")]
    ChannelClosed,

    #[error("no response from actor")]
    NoResponse,
}

impl From<tokio::sync::oneshot::error::RecvError> for ActorError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        ActorError::NoResponse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[derive(Debug)]
    struct PingCommand {
        reply: oneshot::Sender<String>,
    }

    impl ActorMessage for PingCommand {}

    #[tokio::test]
    async fn test_actor_spawn_and_send() {
        let handle = spawn_actor(10, |mut rx: mpsc::Receiver<PingCommand>| async move {
            while let Some(cmd) = rx.recv().await {
                let _ = cmd.reply.send("pong".to_string());
            }
        });

        assert!(handle.is_alive());

        let (tx, rx) = oneshot::channel();
        handle.send(PingCommand { reply: tx }).await.unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response, "pong");
    }
}
