use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use huddle_types::api::Claims;
use huddle_types::events::{GatewayCommand, GatewayEvent, NewMessage};

use crate::GatewayBackend;
use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket has to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<RwLock<HashSet<Uuid>>>;

/// Handle a single websocket connection: Identify handshake, then the
/// event loop until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    backend: Arc<dyn GatewayBackend>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, username) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, backend, user_id, username).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    backend: Arc<dyn GatewayBackend>,
    user_id: Uuid,
    username: String,
) {
    let mut broadcast_rx = dispatcher.subscribe();

    // Replies meant only for this connection (acks, subscription state)
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();
    let send_backend = backend.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(scope) = event.scope {
                        let backend = send_backend.as_ref();
                        if !should_forward(backend, user_id, &send_subscriptions, scope).await {
                            continue;
                        }
                    }

                    if sender.send(Message::Text(event.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                direct = direct_rx.recv() => {
                    let Some(event) = direct else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(cmd) => {
                        let backend = backend.as_ref();
                        handle_command(backend, user_id, cmd, &subscriptions, &direct_tx).await;
                    }
                    Err(e) => {
                        let raw: String = text.as_str().chars().take(200).collect();
                        warn!("{} ({}) bad command: {} -- raw: {}", username_recv, user_id, e, raw);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(text.as_str())
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.username));
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

async fn handle_command(
    backend: &dyn GatewayBackend,
    user_id: Uuid,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
    direct_tx: &mpsc::UnboundedSender<GatewayEvent>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { ids } => {
            let mut allowed = Vec::with_capacity(ids.len());
            for id in ids {
                if backend.can_subscribe(user_id, id).await {
                    allowed.push(id);
                } else {
                    warn!("{} denied subscription to {}", user_id, id);
                }
            }
            let current = update_subscriptions(subscriptions, |subs| subs.extend(allowed));
            let _ = direct_tx.send(GatewayEvent::Subscribed { ids: current });
        }

        GatewayCommand::Unsubscribe { ids } => {
            let current = update_subscriptions(subscriptions, |subs| {
                for id in &ids {
                    subs.remove(id);
                }
            });
            let _ = direct_tx.send(GatewayEvent::Subscribed { ids: current });
        }

        GatewayCommand::NewMessage(msg) => {
            let ack = post_message(backend, user_id, msg).await;
            let _ = direct_tx.send(ack);
        }
    }
}

/// Persist and publish through the backend, then build the sender's ack.
async fn post_message(
    backend: &dyn GatewayBackend,
    user_id: Uuid,
    msg: NewMessage,
) -> GatewayEvent {
    let request_id = msg.request_id.clone();
    let result = match msg.target() {
        Ok(target) => backend.post_message(user_id, target, msg.body, msg.image).await,
        Err(reason) => Err(reason.to_string()),
    };

    match result {
        Ok(message) => GatewayEvent::Ack {
            request_id,
            success: true,
            message: "Successfully created the message".into(),
            data: Some(message),
        },
        Err(reason) => GatewayEvent::Ack {
            request_id,
            success: false,
            message: reason,
            data: None,
        },
    }
}

/// Whether a scoped event goes to this connection. Membership is re-checked
/// on every delivery; a scope the user lost access to is dropped from the set.
async fn should_forward(
    backend: &dyn GatewayBackend,
    user_id: Uuid,
    subscriptions: &Subscriptions,
    scope: Uuid,
) -> bool {
    let subscribed = subscriptions
        .read()
        .map(|subs| subs.contains(&scope))
        .unwrap_or(false);
    if !subscribed {
        return false;
    }

    if backend.can_subscribe(user_id, scope).await {
        return true;
    }

    warn!("{} lost access to {}, unsubscribing", user_id, scope);
    update_subscriptions(subscriptions, |subs| {
        subs.remove(&scope);
    });
    false
}

fn update_subscriptions<F>(subscriptions: &Subscriptions, f: F) -> Vec<Uuid>
where
    F: FnOnce(&mut HashSet<Uuid>),
{
    match subscriptions.write() {
        Ok(mut subs) => {
            f(&mut subs);
            subs.iter().copied().collect()
        }
        Err(e) => {
            warn!("subscription lock poisoned: {}", e);
            Vec::new()
        }
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use huddle_types::models::{Message as ChatMessage, MessageTarget, UserProfile};

    use super::*;

    struct StubBackend {
        allowed: Uuid,
        revoked: AtomicBool,
        posted: Mutex<Vec<MessageTarget>>,
    }

    #[async_trait]
    impl GatewayBackend for StubBackend {
        async fn post_message(
            &self,
            sender_id: Uuid,
            target: MessageTarget,
            body: String,
            image: Option<String>,
        ) -> Result<ChatMessage, String> {
            if target.id() != self.allowed {
                return Err("You are not a member of this DM".into());
            }
            self.posted.lock().unwrap().push(target);
            Ok(ChatMessage {
                id: Uuid::new_v4(),
                body,
                image,
                target,
                workspace_id: Uuid::new_v4(),
                sender: UserProfile {
                    id: sender_id,
                    username: "alice".into(),
                    email: "alice@example.com".into(),
                    avatar: String::new(),
                },
                created_at: Utc::now(),
            })
        }

        async fn can_subscribe(&self, _user_id: Uuid, target_id: Uuid) -> bool {
            target_id == self.allowed && !self.revoked.load(Ordering::SeqCst)
        }
    }

    fn stub() -> StubBackend {
        StubBackend {
            allowed: Uuid::new_v4(),
            revoked: AtomicBool::new(false),
            posted: Mutex::new(Vec::new()),
        }
    }

    fn new_message(room_id: Option<Uuid>, channel_id: Option<Uuid>) -> NewMessage {
        NewMessage {
            request_id: Some("r1".into()),
            room_id,
            channel_id,
            body: "hi".into(),
            image: None,
        }
    }

    #[tokio::test]
    async fn subscribe_keeps_only_authorized_ids() {
        let backend = stub();
        let subs: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let denied = Uuid::new_v4();
        handle_command(
            &backend,
            Uuid::new_v4(),
            GatewayCommand::Subscribe { ids: vec![backend.allowed, denied] },
            &subs,
            &tx,
        )
        .await;

        match rx.recv().await.unwrap() {
            GatewayEvent::Subscribed { ids } => assert_eq!(ids, vec![backend.allowed]),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(subs.read().unwrap().contains(&backend.allowed));
        assert!(!subs.read().unwrap().contains(&denied));
    }

    #[tokio::test]
    async fn new_message_is_acked_to_sender() {
        let backend = stub();
        let msg = new_message(Some(backend.allowed), None);
        let ack = post_message(&backend, Uuid::new_v4(), msg).await;

        match ack {
            GatewayEvent::Ack { request_id, success, data, .. } => {
                assert_eq!(request_id.as_deref(), Some("r1"));
                assert!(success);
                assert_eq!(data.unwrap().target, MessageTarget::Room(backend.allowed));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_target_is_rejected_without_posting() {
        let backend = stub();
        let ack = post_message(
            &backend,
            Uuid::new_v4(),
            new_message(Some(backend.allowed), Some(Uuid::new_v4())),
        )
        .await;

        match ack {
            GatewayEvent::Ack { success, message, data, .. } => {
                assert!(!success);
                assert_eq!(message, "Cannot have both channel_id and room_id");
                assert!(data.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(backend.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn revoked_access_stops_delivery_and_evicts() {
        let backend = stub();
        let user_id = Uuid::new_v4();
        let subs: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
        let (tx, _rx) = mpsc::unbounded_channel();

        handle_command(
            &backend,
            user_id,
            GatewayCommand::Subscribe { ids: vec![backend.allowed] },
            &subs,
            &tx,
        )
        .await;
        assert!(should_forward(&backend, user_id, &subs, backend.allowed).await);
        assert!(!should_forward(&backend, user_id, &subs, Uuid::new_v4()).await);

        backend.revoked.store(true, Ordering::SeqCst);
        assert!(!should_forward(&backend, user_id, &subs, backend.allowed).await);
        assert!(subs.read().unwrap().is_empty());
    }
}
