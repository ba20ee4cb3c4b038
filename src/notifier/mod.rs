//! Outbound message delivery.

use async_trait::async_trait;

pub mod telegram_notifier;

/// Delivers a rendered message to a chat user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user_id: i64, text: &str) -> anyhow::Result<()>;
}
