use crate::database::models::User;
use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

/// Outbound text delivery to a user through the chat front end.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user: &User, message: &str) -> Result<()>;
}

/// Fire-and-forget delivery: failures are logged and never returned to the caller.
pub async fn notify_quietly(notifier: &dyn Notifier, user: &User, message: &str) {
    if let Err(e) = notifier.notify(user, message).await {
        warn!(user_id = user.id, "Failed to deliver notification: {:#}", e);
    }
}

#[cfg(test)]
pub use recording::RecordingNotifier;

#[cfg(test)]
mod recording {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<(i64, String)>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_to(&self, user_id: i64) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter(|(id, _)| *id == user_id)
                .map(|(_, message)| message)
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, user: &User, message: &str) -> Result<()> {
            self.sent.lock().unwrap().push((user.id, message.to_string()));
            Ok(())
        }
    }
}
