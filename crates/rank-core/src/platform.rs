//! Chat platform seam: channels, messages and interactive controls.

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::render::EmbedView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Thread { archived: bool, locked: bool },
    /// Posting here creates a new thread.
    Forum,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: u64,
    pub kind: ChannelKind,
}

impl ChannelInfo {
    pub fn is_thread(&self) -> bool {
        matches!(self.kind, ChannelKind::Thread { .. })
    }

    /// Archived or locked threads reject edits until reopened.
    pub fn needs_reopen(&self) -> bool {
        matches!(self.kind, ChannelKind::Thread { archived, locked } if archived || locked)
    }
}

/// Location of a posted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// Operations the bot needs from the chat platform.
///
/// Implementations must not answer `fetch_channel` from a local cache:
/// archive and lock flags change outside the bot's control.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelInfo, PlatformError>;

    /// Unarchive and unlock a thread, returning its refreshed state.
    async fn reopen_thread(&self, channel_id: u64) -> Result<ChannelInfo, PlatformError>;

    async fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<MessageRef, PlatformError>;

    /// Post the rating prompt with its three dropdowns.
    async fn post_rate_controls(&self, channel_id: u64, entity_id: &str) -> Result<MessageRef, PlatformError>;

    /// Re-bind live rating dropdowns for `entity_id` onto an existing message.
    async fn attach_rate_controls(&self, message: &MessageRef, entity_id: &str) -> Result<(), PlatformError>;

    /// Post a results view. For forum channels this opens a new thread, whose
    /// id is the returned `channel_id`.
    async fn post_results(&self, channel: &ChannelInfo, view: &EmbedView) -> Result<MessageRef, PlatformError>;

    async fn edit_results(&self, message: &MessageRef, view: &EmbedView) -> Result<(), PlatformError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scriptable in-memory platform for tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    pub struct FakePlatform {
        pub channels: Mutex<HashMap<u64, ChannelInfo>>,
        pub messages: Mutex<HashSet<MessageRef>>,
        pub failing_channels: Mutex<HashSet<u64>>,
        pub forbid_reopen: Mutex<HashSet<u64>>,
        pub failing_edits: Mutex<HashSet<MessageRef>>,
        pub attached: Mutex<Vec<(MessageRef, String)>>,
        pub edits: Mutex<Vec<(MessageRef, EmbedView)>>,
        pub posts: Mutex<Vec<(u64, EmbedView)>>,
        pub reopened: Mutex<Vec<u64>>,
        next_id: Mutex<u64>,
    }

    impl FakePlatform {
        pub fn new() -> Self {
            let fake = Self::default();
            *fake.next_id.lock() = 10_000;
            fake
        }

        pub fn add_channel(&self, id: u64, kind: ChannelKind) {
            self.channels.lock().insert(id, ChannelInfo { id, kind });
        }

        pub fn add_message(&self, channel_id: u64, message_id: u64) {
            self.messages.lock().insert(MessageRef { channel_id, message_id });
        }

        fn next(&self) -> u64 {
            let mut id = self.next_id.lock();
            *id += 1;
            *id
        }
    }

    #[async_trait]
    impl Platform for FakePlatform {
        async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelInfo, PlatformError> {
            if self.failing_channels.lock().contains(&channel_id) {
                return Err(PlatformError::Transport("connection reset".into()));
            }
            self.channels
                .lock()
                .get(&channel_id)
                .copied()
                .ok_or_else(|| PlatformError::NotFound(format!("channel {channel_id}")))
        }

        async fn reopen_thread(&self, channel_id: u64) -> Result<ChannelInfo, PlatformError> {
            if self.forbid_reopen.lock().contains(&channel_id) {
                return Err(PlatformError::Forbidden("manage threads".into()));
            }
            self.reopened.lock().push(channel_id);
            let info = ChannelInfo {
                id: channel_id,
                kind: ChannelKind::Thread { archived: false, locked: false },
            };
            self.channels.lock().insert(channel_id, info);
            Ok(info)
        }

        async fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<MessageRef, PlatformError> {
            let msg = MessageRef { channel_id, message_id };
            if self.messages.lock().contains(&msg) {
                Ok(msg)
            } else {
                Err(PlatformError::NotFound(format!("message {message_id}")))
            }
        }

        async fn post_rate_controls(&self, channel_id: u64, entity_id: &str) -> Result<MessageRef, PlatformError> {
            self.fetch_channel(channel_id).await?;
            let msg = MessageRef { channel_id, message_id: self.next() };
            self.messages.lock().insert(msg);
            self.attached.lock().push((msg, entity_id.to_string()));
            Ok(msg)
        }

        async fn attach_rate_controls(&self, message: &MessageRef, entity_id: &str) -> Result<(), PlatformError> {
            self.attached.lock().push((*message, entity_id.to_string()));
            Ok(())
        }

        async fn post_results(&self, channel: &ChannelInfo, view: &EmbedView) -> Result<MessageRef, PlatformError> {
            let channel_id = match channel.kind {
                ChannelKind::Forum => {
                    let thread = self.next();
                    self.add_channel(thread, ChannelKind::Thread { archived: false, locked: false });
                    thread
                }
                _ => channel.id,
            };
            let msg = MessageRef { channel_id, message_id: self.next() };
            self.messages.lock().insert(msg);
            self.posts.lock().push((channel_id, view.clone()));
            Ok(msg)
        }

        async fn edit_results(&self, message: &MessageRef, view: &EmbedView) -> Result<(), PlatformError> {
            if self.failing_edits.lock().contains(message) || !self.messages.lock().contains(message) {
                return Err(PlatformError::NotFound(format!("message {}", message.message_id)));
            }
            self.edits.lock().push((*message, view.clone()));
            Ok(())
        }
    }
}
