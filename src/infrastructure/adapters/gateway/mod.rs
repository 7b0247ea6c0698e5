//! WhatsApp gateway adapter
//!
//! Talks to an Evolution-API-style gateway: the gateway owns the actual
//! WhatsApp session (handshake, pairing cryptography, credential storage)
//! and this adapter drives it over HTTP. Inbound traffic arrives as
//! webhook posts on the facade's /webhook route, which forwards the
//! payloads to `handle_webhook` for mapping onto client events.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::domain::entities::User;
use crate::domain::traits::{ClientEvent, ClientInfo, MessagingClient};
use crate::infrastructure::config::GatewayConfig;

pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
    events: mpsc::Sender<ClientEvent>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, events: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            events,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn emit(&self, event: ClientEvent) {
        if self.events.send(event).await.is_err() {
            tracing::warn!("Supervisor event channel closed, dropping gateway event");
        }
    }

    /// Extract a QR payload from the gateway response. Different gateway
    /// versions nest it differently.
    fn extract_qr(resp: &Value) -> Option<String> {
        resp["qrcode"]["base64"]
            .as_str()
            .or_else(|| resp["base64"].as_str())
            .or_else(|| resp["qrcode"]["code"].as_str())
            .or_else(|| resp["qrcode"].as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    }

    /// Connect an already-created instance; used when create reports the
    /// instance as existing, so a pending handshake is reused instead of
    /// a second session being opened.
    async fn connect_existing(&self) -> Result<(), BotError> {
        let url = self.api_url(&format!("instance/connect/{}", self.config.instance));
        let resp = self
            .client
            .get(&url)
            .header("apikey", &self.config.api_key)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let body: Value = resp
            .json()
            .await
            .map_err(|e| BotError::Parse(e.to_string()))?;

        if let Some(qr) = Self::extract_qr(&body) {
            self.emit(ClientEvent::PairingCode(qr)).await;
        }
        Ok(())
    }

    /// Map one gateway webhook payload onto client events.
    pub async fn handle_webhook(&self, payload: &Value) {
        match payload["event"].as_str().unwrap_or("") {
            "qrcode.updated" => {
                let qr = payload["data"]["qrcode"]["base64"]
                    .as_str()
                    .or_else(|| payload["data"]["qrcode"]["code"].as_str())
                    .or_else(|| payload["data"]["qrcode"].as_str())
                    .unwrap_or("");
                if !qr.is_empty() {
                    self.emit(ClientEvent::PairingCode(qr.to_string())).await;
                }
            }
            "connection.update" => self.handle_connection_update(&payload["data"]).await,
            "messages.upsert" => self.handle_messages_upsert(&payload["data"]).await,
            other => {
                tracing::debug!("Ignoring gateway event '{}'", other);
            }
        }
    }

    async fn handle_connection_update(&self, data: &Value) {
        let state = data["state"].as_str().unwrap_or("");
        match state {
            "connecting" => self.emit(ClientEvent::Authenticated).await,
            "open" | "connected" => self.emit(ClientEvent::Ready).await,
            "close" => {
                let reason = data["statusReason"].as_u64().unwrap_or(0);
                if reason == 401 || reason == 403 {
                    self.emit(ClientEvent::AuthFailure(format!(
                        "gateway closed session with status {}",
                        reason
                    )))
                    .await;
                } else {
                    self.emit(ClientEvent::Disconnected(format!(
                        "gateway connection closed (status {})",
                        reason
                    )))
                    .await;
                }
            }
            other => {
                tracing::debug!("Ignoring connection state '{}'", other);
            }
        }
    }

    async fn handle_messages_upsert(&self, data: &Value) {
        let entries = match data.as_array() {
            Some(arr) => arr.clone(),
            None => vec![data.clone()],
        };

        for entry in entries {
            let key = &entry["key"];
            if key["fromMe"].as_bool().unwrap_or(false) {
                continue;
            }

            let text = entry["message"]["conversation"]
                .as_str()
                .or_else(|| entry["message"]["extendedTextMessage"]["text"].as_str())
                .unwrap_or("");
            if text.is_empty() {
                continue;
            }

            let remote_jid = key["remoteJid"].as_str().unwrap_or("");
            if remote_jid.is_empty() {
                continue;
            }

            let participant = key["participant"].as_str().unwrap_or(remote_jid);
            let sender_id = participant.split('@').next().unwrap_or(participant);
            let mut sender = User::new(sender_id);
            if let Some(name) = entry["pushName"].as_str() {
                sender = sender.with_push_name(name);
            }

            self.emit(ClientEvent::Message {
                chat_id: remote_jid.to_string(),
                text: text.to_string(),
                sender: Some(sender),
            })
            .await;
        }
    }
}

#[async_trait]
impl MessagingClient for GatewayClient {
    async fn connect(&self) -> Result<(), BotError> {
        let url = self.api_url("instance/create");

        // Unique token per create to avoid collisions on the gateway side.
        let instance_token = format!(
            "wabot-{}",
            &uuid::Uuid::new_v4().to_string().replace('-', "")[..12]
        );
        let body = json!({
            "instanceName": self.config.instance,
            "token": instance_token,
            "qrcode": true,
            "webhook": self.config.webhook_url,
        });

        tracing::info!("Creating gateway instance '{}'", self.config.instance);

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(&body)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                // Network-level failures re-arm the supervisor's retry loop.
                self.emit(ClientEvent::Disconnected(e.to_string())).await;
                return Err(BotError::Network(e.to_string()));
            }
        };

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            self.emit(ClientEvent::AuthFailure(text.clone())).await;
            return Err(BotError::Network(format!(
                "gateway rejected credentials ({}): {}",
                status, text
            )));
        }

        if !status.is_success() {
            let lower = text.to_lowercase();
            let instance_exists =
                lower.contains("instance") && (lower.contains("already") || lower.contains("exists"));
            let token_exists = lower.contains("token") && lower.contains("already");

            if instance_exists || token_exists {
                tracing::info!("Instance exists, reusing pending handshake");
                return self.connect_existing().await;
            }

            self.emit(ClientEvent::Disconnected(text.clone())).await;
            return Err(BotError::Network(format!(
                "instance create failed ({}): {}",
                status, text
            )));
        }

        let body: Value = serde_json::from_str(&text).unwrap_or_default();
        if let Some(qr) = Self::extract_qr(&body) {
            self.emit(ClientEvent::PairingCode(qr)).await;
        }
        Ok(())
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<String, BotError> {
        let url = self.api_url(&format!("message/sendText/{}", self.config.instance));
        let body = json!({
            "number": chat_id,
            "text": text,
        });

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.unwrap_or_default();
            return Err(BotError::Send(err_text));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| BotError::Parse(e.to_string()))?;
        Ok(body["key"]["id"].as_str().unwrap_or("unknown").to_string())
    }

    fn client_info(&self) -> ClientInfo {
        ClientInfo {
            name: "wabot".to_string(),
            instance: self.config.instance.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> (GatewayClient, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let config = GatewayConfig {
            api_url: "http://gateway.invalid".to_string(),
            api_key: "test-key".to_string(),
            instance: "test".to_string(),
            webhook_url: "http://127.0.0.1:3000/webhook".to_string(),
        };
        (GatewayClient::new(config, tx), rx)
    }

    #[tokio::test]
    async fn test_qrcode_webhook_emits_pairing_code() {
        let (gateway, mut rx) = client();
        let payload = json!({
            "event": "qrcode.updated",
            "data": { "qrcode": { "base64": "data:image/png;base64,abc" } }
        });

        gateway.handle_webhook(&payload).await;

        assert_eq!(
            rx.recv().await,
            Some(ClientEvent::PairingCode(
                "data:image/png;base64,abc".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_connection_open_emits_ready() {
        let (gateway, mut rx) = client();
        let payload = json!({
            "event": "connection.update",
            "data": { "state": "open" }
        });

        gateway.handle_webhook(&payload).await;

        assert_eq!(rx.recv().await, Some(ClientEvent::Ready));
    }

    #[tokio::test]
    async fn test_unauthorized_close_emits_auth_failure() {
        let (gateway, mut rx) = client();
        let payload = json!({
            "event": "connection.update",
            "data": { "state": "close", "statusReason": 401 }
        });

        gateway.handle_webhook(&payload).await;

        assert!(matches!(
            rx.recv().await,
            Some(ClientEvent::AuthFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_close_emits_disconnected() {
        let (gateway, mut rx) = client();
        let payload = json!({
            "event": "connection.update",
            "data": { "state": "close", "statusReason": 428 }
        });

        gateway.handle_webhook(&payload).await;

        assert!(matches!(
            rx.recv().await,
            Some(ClientEvent::Disconnected(_))
        ));
    }

    #[tokio::test]
    async fn test_inbound_message_maps_chat_text_and_sender() {
        let (gateway, mut rx) = client();
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "key": {
                    "remoteJid": "628123@c.us",
                    "fromMe": false,
                    "participant": "628123@s.whatsapp.net"
                },
                "pushName": "Dewi",
                "message": { "conversation": ".movie dune" }
            }
        });

        gateway.handle_webhook(&payload).await;

        let event = rx.recv().await.expect("message event");
        let ClientEvent::Message { chat_id, text, sender } = event else {
            panic!("expected message event, got {:?}", event);
        };
        assert_eq!(chat_id, "628123@c.us");
        assert_eq!(text, ".movie dune");
        let sender = sender.expect("sender mapped");
        assert_eq!(sender.id, "628123");
        assert_eq!(sender.display_name(), "Dewi");
    }

    #[tokio::test]
    async fn test_own_messages_are_skipped() {
        let (gateway, mut rx) = client();
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "key": { "remoteJid": "628123@c.us", "fromMe": true },
                "message": { "conversation": ".ping" }
            }
        });

        gateway.handle_webhook(&payload).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_extended_text_messages_are_read() {
        let (gateway, mut rx) = client();
        let payload = json!({
            "event": "messages.upsert",
            "data": [{
                "key": { "remoteJid": "628123@c.us", "fromMe": false },
                "message": { "extendedTextMessage": { "text": ".ping" } }
            }]
        });

        gateway.handle_webhook(&payload).await;

        assert!(matches!(
            rx.recv().await,
            Some(ClientEvent::Message { text, .. }) if text == ".ping"
        ));
    }
}
