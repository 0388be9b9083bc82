//! Update routing and the long-poll loop

use crate::error::BotError;
use crate::telegram::{Message, TelegramClient, Update};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tally_domain::traits::{ChatPlatform, ExtractionProvider, LedgerStore};
use tally_domain::Source;
use tally_pipeline::Pipeline;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Reply to `/start`
pub const START_REPLY: &str = "Send a receipt photo or text like: \"Bought milk for 100 THB\".";

/// Pause after a failed poll before asking again
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// How long in-flight messages may run after shutdown is requested
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// What to do with one incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Greet the user
    Start,
    /// Run the extraction pipeline for this source
    Process(Source),
    /// Nothing to do
    Ignore,
}

/// Classify a message. Attachments win over text; commands other than
/// `/start` are ignored.
pub fn route(message: &Message) -> Route {
    if message.photo.as_ref().is_some_and(|p| !p.is_empty()) {
        return Route::Process(Source::Photo);
    }
    if message.voice.is_some() {
        return Route::Process(Source::Voice);
    }
    if message.audio.is_some() {
        return Route::Process(Source::Audio);
    }

    match message.text.as_deref().map(str::trim) {
        Some(text) if is_command(text, "start") => Route::Start,
        Some(text) if text.starts_with('/') => Route::Ignore,
        Some(text) if !text.is_empty() => Route::Process(Source::Text),
        _ => Route::Ignore,
    }
}

/// Matches `/name` and `/name@botname`, with or without arguments
fn is_command(text: &str, name: &str) -> bool {
    let Some(rest) = text.strip_prefix('/') else {
        return false;
    };
    let word = rest.split_whitespace().next().unwrap_or_default();
    let command = word.split('@').next().unwrap_or_default();
    command == name
}

/// Long-polling bot: feeds each update into its own pipeline task
pub struct Bot<P, S> {
    telegram: Arc<TelegramClient>,
    pipeline: Pipeline<P, S>,
    poll_timeout_secs: u64,
}

impl<P, S> Bot<P, S>
where
    P: ExtractionProvider + 'static,
    S: LedgerStore + Send + 'static,
    S::Error: fmt::Display,
{
    /// Create a bot
    pub fn new(telegram: TelegramClient, pipeline: Pipeline<P, S>, poll_timeout_secs: u64) -> Self {
        Self {
            telegram: Arc::new(telegram),
            pipeline,
            poll_timeout_secs,
        }
    }

    /// Poll until Ctrl+C, then let in-flight messages finish.
    pub async fn run(&self) -> Result<(), BotError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Poll until `shutdown` resolves.
    ///
    /// Updates are acknowledged as soon as they are handed to a task, so a
    /// crash mid-pipeline does not replay them. Tasks still running at
    /// shutdown get [`SHUTDOWN_GRACE`] to finish before they are aborted.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), BotError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut tasks = JoinSet::new();
        let mut offset = 0;
        let mut failed = false;
        info!("Polling for updates (timeout: {}s)", self.poll_timeout_secs);

        loop {
            tokio::select! {
                polled = self.poll(offset, failed) => {
                    match polled {
                        Ok(updates) => {
                            failed = false;
                            for update in updates {
                                offset = offset.max(update.update_id + 1);
                                self.dispatch(update, &mut tasks);
                            }
                        }
                        Err(e) => {
                            warn!("Polling failed: {}", e);
                            failed = true;
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping bot");
                    break;
                }
            }

            // Reap finished tasks so the set does not grow
            while tasks.try_join_next().is_some() {}
        }

        drain(&mut tasks, SHUTDOWN_GRACE).await;
        Ok(())
    }

    /// One long poll, after a pause if the previous one failed
    async fn poll(&self, offset: i64, after_failure: bool) -> Result<Vec<Update>, BotError> {
        if after_failure {
            tokio::time::sleep(POLL_ERROR_PAUSE).await;
        }
        self.telegram.get_updates(offset, self.poll_timeout_secs).await
    }

    fn dispatch(&self, update: Update, tasks: &mut JoinSet<()>) {
        let Some(message) = update.message else {
            debug!("Skipping update {} without a message", update.update_id);
            return;
        };

        match route(&message) {
            Route::Ignore => {
                debug!("Ignoring message {} in chat {}", message.message_id, message.chat.id);
            }
            Route::Start => {
                let telegram = Arc::clone(&self.telegram);
                let chat_id = message.chat.id;
                tasks.spawn(async move {
                    if let Err(e) = telegram.send_text(chat_id, START_REPLY).await {
                        warn!("Failed to greet chat {}: {}", chat_id, e);
                    }
                });
            }
            Route::Process(source) => {
                let telegram = Arc::clone(&self.telegram);
                let pipeline = self.pipeline.clone();
                let incoming = message.to_incoming();
                debug!("Update {} routed to {} pipeline", update.update_id, source);
                tasks.spawn(async move {
                    // Reply failures are already logged by the pipeline
                    let _ = pipeline.handle(telegram.as_ref(), source, &incoming).await;
                });
            }
        }
    }
}

/// Wait up to `grace` for running tasks, then abort the rest
async fn drain(tasks: &mut JoinSet<()>, grace: Duration) {
    if tasks.is_empty() {
        return;
    }

    info!("Waiting for {} in-flight messages", tasks.len());
    let finished = tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;

    if finished.is_err() {
        warn!("Aborting {} messages still running after {:?}", tasks.len(), grace);
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;
    use tally_domain::{ExtractionResult, FieldBindings, Position};
    use tally_llm::MockProvider;
    use tally_store::SqliteStore;

    fn milk() -> ExtractionResult {
        ExtractionResult {
            currency: "THB".to_string(),
            spend: 100.0,
            positions: vec![Position::new("milk", 100.0)],
            cashier_name: String::new(),
        }
    }

    fn text_update(update_id: i64, text: &str) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "chat": {"id": 5},
                "from": {"id": 7},
                "text": text
            }
        }))
        .unwrap()
    }

    /// Bot whose Telegram calls all fail: nothing listens on the discard port
    fn offline_bot(provider: MockProvider) -> (Bot<MockProvider, SqliteStore>, Arc<Mutex<SqliteStore>>) {
        let store = SqliteStore::new(":memory:").unwrap();
        let pipeline = Pipeline::new(provider, store, FieldBindings::default());
        let shared = pipeline.store();
        let telegram = TelegramClient::new("t").with_api_base("http://127.0.0.1:9");
        (Bot::new(telegram, pipeline, 10), shared)
    }

    #[tokio::test]
    async fn test_drain_waits_for_running_messages() {
        let provider = MockProvider::new(milk()).with_delay(Duration::from_millis(50));
        let (bot, store) = offline_bot(provider.clone());
        let mut tasks = JoinSet::new();

        bot.dispatch(text_update(1, "Bought milk for 100 THB"), &mut tasks);
        bot.dispatch(text_update(2, "/help"), &mut tasks);
        assert_eq!(tasks.len(), 1);

        drain(&mut tasks, Duration::from_secs(5)).await;

        assert!(tasks.is_empty());
        assert_eq!(provider.call_count(), 1);
        assert_eq!(store.lock().unwrap().count().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_after_grace() {
        let provider = MockProvider::new(milk()).with_delay(Duration::from_secs(60));
        let (bot, store) = offline_bot(provider.clone());
        let mut tasks = JoinSet::new();

        bot.dispatch(text_update(1, "Bought milk for 100 THB"), &mut tasks);
        drain(&mut tasks, Duration::from_secs(1)).await;

        assert!(tasks.is_empty());
        assert_eq!(provider.call_count(), 1);
        assert_eq!(store.lock().unwrap().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_error_pause() {
        let (bot, _) = offline_bot(MockProvider::default());
        let started = Instant::now();

        let stopped = tokio::time::timeout(
            Duration::from_secs(5),
            bot.run_until(tokio::time::sleep(POLL_ERROR_PAUSE / 4)),
        )
        .await;

        assert!(matches!(stopped, Ok(Ok(()))));
        assert!(started.elapsed() < POLL_ERROR_PAUSE);
    }

    fn message(json: &str) -> Message {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_plain_text_is_processed() {
        let msg = message(r#"{"message_id":1,"chat":{"id":1},"text":"Bought milk for 100 THB"}"#);
        assert_eq!(route(&msg), Route::Process(Source::Text));
    }

    #[test]
    fn test_start_command() {
        for text in ["/start", "/start@tally_bot", "/start payload"] {
            let msg = Message {
                text: Some(text.to_string()),
                ..Default::default()
            };
            assert_eq!(route(&msg), Route::Start, "{}", text);
        }
    }

    #[test]
    fn test_other_commands_are_ignored() {
        for text in ["/help", "/starting", "/"] {
            let msg = Message {
                text: Some(text.to_string()),
                ..Default::default()
            };
            assert_eq!(route(&msg), Route::Ignore, "{}", text);
        }
    }

    #[test]
    fn test_empty_message_is_ignored() {
        let msg = message(r#"{"message_id":1,"chat":{"id":1},"text":"   "}"#);
        assert_eq!(route(&msg), Route::Ignore);

        let msg = message(r#"{"message_id":2,"chat":{"id":1}}"#);
        assert_eq!(route(&msg), Route::Ignore);
    }

    #[test]
    fn test_attachments_win_over_text() {
        let msg = message(
            r#"{"message_id":1,"chat":{"id":1},"caption":"/help",
                "photo":[{"file_id":"p","width":10,"height":10}]}"#,
        );
        assert_eq!(route(&msg), Route::Process(Source::Photo));

        let msg = message(r#"{"message_id":2,"chat":{"id":1},"voice":{"file_id":"v"}}"#);
        assert_eq!(route(&msg), Route::Process(Source::Voice));

        let msg = message(r#"{"message_id":3,"chat":{"id":1},"audio":{"file_id":"a"}}"#);
        assert_eq!(route(&msg), Route::Process(Source::Audio));
    }

    #[test]
    fn test_empty_photo_list_is_not_a_photo() {
        let msg = message(r#"{"message_id":1,"chat":{"id":1},"photo":[],"text":"50 EUR"}"#);
        assert_eq!(route(&msg), Route::Process(Source::Text));
    }
}
