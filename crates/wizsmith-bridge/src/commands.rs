//! Inbound command forwarding.
//!
//! Messages arriving on `wizsmith/commands/{device_id}/{action...}` are
//! forwarded to the manager as attribute updates. Forwarding failures are
//! logged and scoped to the single command.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use wizsmith_mqtt::{parse_command_topic, InboundMessage};
use wizsmith_openremote::{CommandForward, OpenRemoteClient};

/// Drain inbound MQTT messages until the stop signal flips or the
/// connection driver goes away.
pub async fn forward_commands(
    mut inbound: mpsc::Receiver<InboundMessage>,
    client: Arc<OpenRemoteClient>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            changed = stop.changed() => {
                // A dropped sender counts as a stop signal.
                if changed.is_err() || *stop.borrow() {
                    info!("command forwarder stopped");
                    return;
                }
                continue;
            }
            message = inbound.recv() => match message {
                Some(message) => message,
                None => {
                    debug!("inbound channel closed, command forwarder exiting");
                    return;
                }
            },
        };

        let Some((device_id, action)) = parse_command_topic(&message.topic) else {
            debug!(topic = %message.topic, "ignoring non-command message");
            continue;
        };

        let command = CommandForward {
            device_id,
            action,
            payload: String::from_utf8_lossy(&message.payload).into_owned(),
        };
        match client.forward_command(&command).await {
            Ok(()) => debug!(device = %command.device_id, "command forwarded"),
            Err(e) => warn!(device = %command.device_id, "command forward failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;
    use wizsmith_openremote::Credentials;

    #[tokio::test]
    async fn commands_are_forwarded_as_attribute_updates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/realms/master/protocol/openid-connect/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok"}"#)
            .create_async()
            .await;
        let update = server
            .mock("POST", "/api/master/asset/attribute/update")
            .match_body(Matcher::Json(json!({
                "device_id": "dev1",
                "action": "light/on",
                "payload": "{\"brightness\":80}",
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = Arc::new(OpenRemoteClient::new(
            server.url(),
            "master",
            Credentials {
                username: Some("admin".into()),
                password: Some("secret".into()),
                ..Default::default()
            },
        ));
        client.authenticate().await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(forward_commands(rx, client, stop_rx));

        tx.send(InboundMessage {
            topic: "wizsmith/commands/dev1/light/on".to_string(),
            payload: br#"{"brightness":80}"#.to_vec(),
            retain: false,
        })
        .await
        .unwrap();
        // Unrelated topics are ignored without a request.
        tx.send(InboundMessage {
            topic: "wizsmith/status".to_string(),
            payload: b"ok".to_vec(),
            retain: false,
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        update.assert_async().await;
    }

    #[tokio::test]
    async fn forwarder_exits_when_the_stop_sender_is_dropped() {
        let client = Arc::new(OpenRemoteClient::new(
            "http://unused.invalid",
            "master",
            Credentials::default(),
        ));

        // Keep the inbound side open so the exit can only come from the
        // stop channel.
        let (_tx, rx) = mpsc::channel::<InboundMessage>(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(forward_commands(rx, client, stop_rx));

        drop(stop_tx);
        handle.await.unwrap();
    }
}
