//! # Channel Registry
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::protocol::PubSubMessage;

/// Callback for messages arriving on one channel. Runs on the engine task, so
/// it should return quickly.
pub type MessageHandler = Arc<dyn Fn(&PubSubMessage) + Send + Sync>;

/// Channels this session believes it is subscribed to, each with an optional
/// handler.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Option<MessageHandler>>,
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry").field("channels", &self.channels()).finish()
    }
}

impl ChannelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a channel, replacing any earlier handler.
    pub fn insert(&mut self, channel: &str, handler: Option<MessageHandler>) {
        if self.channels.insert(channel.to_string(), handler).is_some() {
            log::debug!("Replaced handler for channel {}", channel);
        }
    }

    /// Forgets a channel. Returns whether it was known.
    pub fn remove(&mut self, channel: &str) -> bool {
        self.channels.remove(channel).is_some()
    }

    /// Forgets every channel.
    pub fn clear(&mut self) {
        self.channels.clear();
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Runs the handler registered for the message's channel. Returns whether
    /// a handler ran.
    pub fn dispatch(&self, message: &PubSubMessage) -> bool {
        match self.channels.get(&message.channel) {
            Some(Some(handler)) => {
                handler(message);
                true
            }
            _ => false,
        }
    }
}
