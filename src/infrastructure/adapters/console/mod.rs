//! Console adapter for development/testing
//!
//! Stands in for the gateway when none is configured: stdin lines become
//! inbound messages on a fixed chat, outbound messages go to stdout, and
//! the session reports ready immediately after connect.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::domain::entities::User;
use crate::domain::traits::{ClientEvent, ClientInfo, MessagingClient};

const CONSOLE_CHAT: &str = "console";

pub struct ConsoleClient {
    events: mpsc::Sender<ClientEvent>,
    reading: AtomicBool,
}

impl ConsoleClient {
    pub fn new(events: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            events,
            reading: AtomicBool::new(false),
        }
    }

    fn spawn_stdin_reader(&self) {
        // One reader task per process, no matter how often connect runs.
        if self.reading.swap(true, Ordering::SeqCst) {
            return;
        }

        let events = self.events.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let text = line.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                let event = ClientEvent::Message {
                    chat_id: CONSOLE_CHAT.to_string(),
                    text,
                    sender: Some(User::new(CONSOLE_CHAT)),
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
        });
    }
}

#[async_trait]
impl MessagingClient for ConsoleClient {
    async fn connect(&self) -> Result<(), BotError> {
        tracing::info!("Starting console client (dev mode)");
        self.spawn_stdin_reader();
        let _ = self.events.send(ClientEvent::Authenticated).await;
        let _ = self.events.send(ClientEvent::Ready).await;
        Ok(())
    }

    async fn send_text(&self, _chat_id: &str, text: &str) -> Result<String, BotError> {
        println!("[BOT] {}", text);
        Ok("console_msg".to_string())
    }

    fn client_info(&self) -> ClientInfo {
        ClientInfo {
            name: "wabot".to_string(),
            instance: CONSOLE_CHAT.to_string(),
        }
    }
}
