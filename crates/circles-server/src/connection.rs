//! Per-connection protocol state machine.
//!
//! A [`Connection`] starts in [`ConnState::Connecting`]. The first
//! successful `authenticate` moves it to [`ConnState::Authenticated`];
//! transport close moves it to [`ConnState::Closed`]. Every inbound frame is
//! processed to completion before the next one is read, and every failure
//! is reported back to this connection as an `error` frame.

use crate::context::ServerContext;
use crate::presence::{broadcast, ConnId, ConnectionHandle};
use circles_core::{parse_envelope, ClientFrame, CircleError, CircleResult, ServerFrame};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Authenticated { user_id: String, email: String },
    Closed,
}

pub struct Connection {
    ctx: Arc<ServerContext>,
    handle: ConnectionHandle,
    remote: Option<IpAddr>,
    state: ConnState,
}

impl Connection {
    pub fn new(ctx: Arc<ServerContext>, handle: ConnectionHandle, remote: Option<IpAddr>) -> Self {
        Self {
            ctx,
            handle,
            remote,
            state: ConnState::Connecting,
        }
    }

    pub fn id(&self) -> ConnId {
        self.handle.id()
    }

    pub fn state(&self) -> &ConnState {
        &self.state
    }

    pub fn user_id(&self) -> Option<&str> {
        match &self.state {
            ConnState::Authenticated { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    /// Process one inbound text frame.
    pub async fn handle_text(&mut self, text: &str) {
        if self.state == ConnState::Closed {
            return;
        }
        if let Err(e) = self.dispatch(text).await {
            debug!(conn_id = self.id(), status = e.status(), field = e.field(), error = %e, "frame rejected");
            self.reply_error(&e);
        }
    }

    /// Send an `error` frame to this connection only.
    pub fn reply_error(&self, err: &CircleError) {
        self.reply(&ServerFrame::error_from(err));
    }

    fn reply<T: Serialize>(&self, frame: &T) {
        let Some(text) = broadcast::serialize(frame) else {
            return;
        };
        if !self.handle.deliver(text) {
            warn!(conn_id = self.id(), "reply dropped, outbound queue unavailable");
        }
    }

    async fn dispatch(&mut self, text: &str) -> CircleResult<()> {
        let raw = parse_envelope(text)?;
        if !raw.is_authenticate() && self.user_id().is_none() {
            return Err(CircleError::auth("auth", "Authentication required"));
        }

        match ClientFrame::try_from(raw)? {
            ClientFrame::Authenticate { token } => self.authenticate(&token).await,
            ClientFrame::JoinCircle { circle_id } => self.join_circle(&circle_id).await,
            ClientFrame::LeaveCircle { circle_id } => self.leave_circle(&circle_id).await,
            ClientFrame::SendMessage { circle_id, content } => {
                self.send_message(&circle_id, &content).await
            }
            ClientFrame::Typing {
                circle_id,
                is_typing,
            } => self.typing(&circle_id, is_typing).await,
        }
    }

    async fn authenticate(&mut self, token: &str) -> CircleResult<()> {
        if !self.ctx.allow_auth_attempt(self.remote).await {
            warn!(conn_id = self.id(), remote = ?self.remote, "auth rate limit exceeded");
            return Err(CircleError::RateLimited("authenticate".into()));
        }

        let claims = self.ctx.verifier.verify(token)?;
        let email = claims
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| CircleError::auth("token", "Token must contain user email"))?;

        let user = self
            .ctx
            .bounded("find_active_user_by_email", self.ctx.store.find_active_user_by_email(&email))
            .await?
            .ok_or_else(|| CircleError::not_found("user", "User not found"))?;

        let circles = self
            .ctx
            .bounded("list_active_memberships", self.ctx.store.list_active_memberships(&user.id))
            .await?;

        if let Some(previous) = self.user_id() {
            if previous != user.id {
                let previous = previous.to_string();
                self.ctx.presence.disconnect(&previous, self.id()).await;
            }
        }

        let session_id = self
            .ctx
            .presence
            .establish(&user.id, &user.email, self.handle.clone(), &circles)
            .await;

        info!(
            conn_id = self.id(),
            user_id = %user.id,
            session_id = %session_id,
            circles = circles.len(),
            "connection authenticated"
        );

        self.state = ConnState::Authenticated {
            user_id: user.id.clone(),
            email: user.email.clone(),
        };
        self.reply(&ServerFrame::authenticated(user.public()));
        Ok(())
    }

    /// The authenticated user id, or an auth error.
    fn current_user(&self) -> CircleResult<String> {
        self.user_id()
            .map(str::to_string)
            .ok_or_else(|| CircleError::auth("auth", "Authentication required"))
    }

    async fn require_membership(&self, user_id: &str, circle_id: &str) -> CircleResult<()> {
        let membership = self
            .ctx
            .bounded("find_membership", self.ctx.store.find_membership(user_id, circle_id))
            .await?;
        match membership {
            Some(m) if m.is_active => Ok(()),
            _ => Err(CircleError::forbidden("circleId", "Not a member of this circle")),
        }
    }

    async fn join_circle(&mut self, circle_id: &str) -> CircleResult<()> {
        let user_id = self.current_user()?;
        self.require_membership(&user_id, circle_id).await?;

        if !self.ctx.presence.join_circle(&user_id, self.id(), circle_id).await {
            return Err(superseded());
        }
        debug!(user_id = %user_id, circle_id = %circle_id, "joined circle");
        self.reply(&ServerFrame::joined_circle(circle_id));
        Ok(())
    }

    async fn leave_circle(&mut self, circle_id: &str) -> CircleResult<()> {
        let user_id = self.current_user()?;
        if !self.ctx.presence.leave_circle(&user_id, self.id(), circle_id).await {
            return Err(superseded());
        }
        self.reply(&ServerFrame::left_circle(circle_id));
        Ok(())
    }

    /// Fail if another connection has since taken over this user's session.
    async fn require_bound(&self, user_id: &str) -> CircleResult<()> {
        if self.ctx.presence.is_bound(user_id, self.id()).await {
            Ok(())
        } else {
            Err(superseded())
        }
    }

    async fn send_message(&mut self, circle_id: &str, content: &str) -> CircleResult<()> {
        let user_id = self.current_user()?;
        self.require_bound(&user_id).await?;
        self.require_membership(&user_id, circle_id).await?;

        let message = self
            .ctx
            .bounded("create_message", self.ctx.store.create_message(&user_id, circle_id, content))
            .await?;

        let delivered = self
            .ctx
            .presence
            .broadcast_from(
                &user_id,
                self.id(),
                circle_id,
                &ServerFrame::NewMessage { data: message.clone() },
                &[],
            )
            .await
            .ok_or_else(superseded)?;
        debug!(
            user_id = %user_id,
            circle_id = %circle_id,
            message_id = %message.id,
            delivered,
            "message broadcast"
        );
        self.reply(&ServerFrame::message_sent(message));
        Ok(())
    }

    async fn typing(&mut self, circle_id: &str, is_typing: bool) -> CircleResult<()> {
        let user_id = self.current_user()?;
        self.ctx
            .presence
            .broadcast_from(
                &user_id,
                self.id(),
                circle_id,
                &ServerFrame::user_typing(&user_id, circle_id, is_typing),
                &[user_id.as_str()],
            )
            .await
            .ok_or_else(superseded)?;
        Ok(())
    }

    /// Transport is gone: drop this connection's session and notify its rooms.
    /// Idempotent.
    pub async fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, ConnState::Closed);
        if let ConnState::Authenticated { user_id, .. } = previous {
            let rooms = self.ctx.presence.disconnect(&user_id, self.id()).await;
            debug!(conn_id = self.id(), user_id = %user_id, rooms = rooms.len(), "connection cleanup");
        }
    }
}

fn superseded() -> CircleError {
    CircleError::auth("auth", "Session superseded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtVerifier;
    use crate::presence::Outbound;
    use crate::store::{CircleStore, MemoryStore, Membership, StoreUser};
    use async_trait::async_trait;
    use circles_core::token::sign_claims;
    use circles_core::{create_access_token, decode_frame, AccessClaims, MessagePayload};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const SECRET: &[u8] = b"connection-test-secret";

    struct Client {
        conn: Connection,
        rx: mpsc::Receiver<Outbound>,
    }

    impl Client {
        fn open(ctx: &Arc<ServerContext>) -> Self {
            Self::open_from(ctx, None)
        }

        fn open_from(ctx: &Arc<ServerContext>, remote: Option<IpAddr>) -> Self {
            let (tx, rx) = mpsc::channel(32);
            let handle = ConnectionHandle::new(ctx.presence.next_connection_id(), tx);
            Self {
                conn: Connection::new(ctx.clone(), handle, remote),
                rx,
            }
        }

        async fn send(&mut self, frame: serde_json::Value) {
            self.conn.handle_text(&frame.to_string()).await;
        }

        async fn login(&mut self, user_id: &str) -> ServerFrame {
            let token = create_access_token(SECRET, user_id, &email(user_id), 60).unwrap();
            self.send(serde_json::json!({"type": "authenticate", "token": token})).await;
            self.next().expect("auth reply")
        }

        fn next(&mut self) -> Option<ServerFrame> {
            loop {
                match self.rx.try_recv().ok()? {
                    Outbound::Text(text) => return Some(decode_frame(&text).unwrap()),
                    _ => continue,
                }
            }
        }

        fn drain(&mut self) -> Vec<ServerFrame> {
            std::iter::from_fn(|| self.next()).collect()
        }
    }

    fn email(user_id: &str) -> String {
        format!("{user_id}@example.com")
    }

    fn error_parts(frame: ServerFrame) -> (String, u16) {
        match frame {
            ServerFrame::Error { field, status, .. } => (field, status),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    async fn store_with(users: &[(&str, &[&str])]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, circles) in users {
            store
                .add_user(StoreUser {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                    email: email(id),
                    profile_photo_url: None,
                    is_active: true,
                })
                .await;
            for c in *circles {
                store.set_membership(id, c, true).await;
            }
        }
        store
    }

    fn context(store: Arc<dyn CircleStore>) -> Arc<ServerContext> {
        Arc::new(ServerContext::new(store, Arc::new(JwtVerifier::new(SECRET))))
    }

    #[tokio::test]
    async fn authenticate_replies_with_public_profile() {
        let store = store_with(&[("u1", &["general"])]).await;
        let ctx = context(store);
        let mut c = Client::open(&ctx);

        match c.login("u1").await {
            ServerFrame::Authenticated { success, user, .. } => {
                assert!(success);
                assert_eq!(user.id, "u1");
                assert_eq!(user.email, "u1@example.com");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(c.conn.user_id(), Some("u1"));
        assert!(ctx.presence.members_of("general").await.contains("u1"));
    }

    #[tokio::test]
    async fn message_reaches_room_and_echoes_to_sender() {
        let store = store_with(&[("u1", &["general"]), ("u2", &["general"])]).await;
        let ctx = context(store.clone());
        let mut c1 = Client::open(&ctx);
        let mut c2 = Client::open(&ctx);
        c1.login("u1").await;
        c2.login("u2").await;

        c1.send(serde_json::json!({"type": "send-message", "circleId": "general", "content": "hi"}))
            .await;

        let received: Vec<MessagePayload> = c2
            .drain()
            .into_iter()
            .filter_map(|f| match f {
                ServerFrame::NewMessage { data } => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content, "hi");
        assert_eq!(received[0].user_id, "u1");

        let own = c1.drain();
        let sent_id = own
            .iter()
            .find_map(|f| match f {
                ServerFrame::MessageSent { message, .. } => Some(message.id.clone()),
                _ => None,
            })
            .expect("message-sent reply");
        assert_eq!(sent_id, received[0].id);
        assert!(own.iter().any(|f| matches!(f, ServerFrame::NewMessage { .. })));
        assert_eq!(store.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn unauthenticated_frames_are_rejected() {
        let store = store_with(&[("u2", &["general"])]).await;
        let ctx = context(store.clone());
        let mut watcher = Client::open(&ctx);
        watcher.login("u2").await;

        let mut c = Client::open(&ctx);
        c.send(serde_json::json!({"type": "send-message", "circleId": "general", "content": "hi"}))
            .await;
        assert_eq!(error_parts(c.next().unwrap()), ("auth".into(), 401));
        assert!(store.messages().await.is_empty());
        assert!(watcher.next().is_none());

        // Unknown types are also an auth failure before login.
        c.send(serde_json::json!({"type": "dance"})).await;
        assert_eq!(error_parts(c.next().unwrap()), ("auth".into(), 401));
    }

    #[tokio::test]
    async fn join_without_membership_is_forbidden() {
        let store = store_with(&[("u1", &[])]).await;
        store.set_membership("u1", "secret", false).await;
        let ctx = context(store);
        let mut c = Client::open(&ctx);
        c.login("u1").await;

        for circle in ["elsewhere", "secret"] {
            c.send(serde_json::json!({"type": "join-circle", "circleId": circle})).await;
            assert_eq!(error_parts(c.next().unwrap()), ("circleId".into(), 403));
            assert!(ctx.presence.members_of(circle).await.is_empty());
        }
        assert_eq!(ctx.presence.room_count().await, 0);
    }

    #[tokio::test]
    async fn join_and_leave_notify_peers() {
        let store = store_with(&[("u1", &[]), ("u2", &["art"])]).await;
        store.set_membership("u1", "art", true).await;
        let ctx = context(store);
        let mut c1 = Client::open(&ctx);
        let mut c2 = Client::open(&ctx);
        c1.login("u1").await;
        c2.login("u2").await;

        c1.send(serde_json::json!({"type": "join-circle", "circleId": "art"})).await;
        assert!(matches!(c1.next(), Some(ServerFrame::JoinedCircle { .. })));
        assert_eq!(c2.next(), Some(ServerFrame::user_joined("u1", "art")));

        c1.send(serde_json::json!({"type": "leave-circle", "circleId": "art"})).await;
        assert!(matches!(c1.next(), Some(ServerFrame::LeftCircle { .. })));
        assert_eq!(c2.next(), Some(ServerFrame::user_left("u1", "art")));
        assert!(!ctx.presence.members_of("art").await.contains("u1"));
    }

    #[tokio::test]
    async fn typing_excludes_sender_and_skips_membership_check() {
        let store = store_with(&[("u1", &[]), ("u2", &["general"])]).await;
        let ctx = context(store);
        let mut c1 = Client::open(&ctx);
        let mut c2 = Client::open(&ctx);
        c1.login("u1").await;
        c2.login("u2").await;

        c1.send(serde_json::json!({"type": "typing", "circleId": "general", "isTyping": true}))
            .await;
        assert_eq!(c2.next(), Some(ServerFrame::user_typing("u1", "general", true)));
        assert!(c1.next().is_none());

        c1.send(serde_json::json!({"type": "typing", "circleId": "general", "isTyping": "yes"}))
            .await;
        assert_eq!(error_parts(c1.next().unwrap()), ("isTyping".into(), 400));
    }

    #[tokio::test]
    async fn close_cleans_up_every_room() {
        let store = store_with(&[("u1", &["A", "B"]), ("u2", &["A"])]).await;
        let ctx = context(store);
        let mut c1 = Client::open(&ctx);
        let mut c2 = Client::open(&ctx);
        c1.login("u1").await;
        c2.login("u2").await;

        c1.conn.close().await;
        assert_eq!(c1.conn.state(), &ConnState::Closed);
        assert!(ctx.presence.session("u1").await.is_none());
        assert!(!ctx.presence.members_of("A").await.contains("u1"));
        assert!(!ctx.presence.members_of("B").await.contains("u1"));
        assert_eq!(c2.next(), Some(ServerFrame::user_left("u1", "A")));

        // Frames after close are ignored.
        c1.send(serde_json::json!({"type": "typing", "circleId": "A", "isTyping": true})).await;
        assert!(c1.next().is_none());
        c1.conn.close().await;
    }

    #[tokio::test]
    async fn second_login_supersedes_first_connection() {
        let store = store_with(&[("u1", &["general"])]).await;
        let ctx = context(store);
        let mut old = Client::open(&ctx);
        let mut new = Client::open(&ctx);
        old.login("u1").await;
        new.login("u1").await;

        let closed = std::iter::from_fn(|| old.rx.try_recv().ok())
            .any(|o| matches!(o, Outbound::Close { code: crate::presence::CLOSE_SUPERSEDED, .. }));
        assert!(closed);

        old.conn.close().await;
        assert_eq!(ctx.presence.session("u1").await.unwrap().handle.id(), new.conn.id());
        assert!(ctx.presence.members_of("general").await.contains("u1"));
    }

    #[tokio::test]
    async fn superseded_connection_cannot_speak_for_user() {
        let store = store_with(&[("u1", &["general"]), ("u2", &["general"])]).await;
        let ctx = context(store.clone());
        let mut old = Client::open(&ctx);
        let mut new = Client::open(&ctx);
        let mut peer = Client::open(&ctx);
        old.login("u1").await;
        new.login("u1").await;
        peer.login("u2").await;
        old.drain();
        peer.drain();

        old.send(serde_json::json!({"type": "send-message", "circleId": "general", "content": "from stale"}))
            .await;
        match old.next().unwrap() {
            ServerFrame::Error { field, status, message, .. } => {
                assert_eq!((field.as_str(), status), ("auth", 401));
                assert_eq!(message, "Session superseded");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(store.messages().await.is_empty());

        old.send(serde_json::json!({"type": "typing", "circleId": "general", "isTyping": true}))
            .await;
        assert_eq!(error_parts(old.next().unwrap()), ("auth".into(), 401));
        assert!(peer.next().is_none());

        // The live connection is unaffected.
        new.send(serde_json::json!({"type": "send-message", "circleId": "general", "content": "live"}))
            .await;
        assert!(matches!(peer.next(), Some(ServerFrame::NewMessage { .. })));
        assert_eq!(store.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn reauth_as_other_user_drops_previous_registration() {
        let store = store_with(&[("u1", &["A"]), ("u2", &["B"])]).await;
        let ctx = context(store);
        let mut c = Client::open(&ctx);
        c.login("u1").await;
        c.login("u2").await;

        assert!(!ctx.presence.is_online("u1").await);
        assert!(ctx.presence.members_of("A").await.is_empty());
        assert!(ctx.presence.members_of("B").await.contains("u2"));
        assert_eq!(c.conn.user_id(), Some("u2"));
    }

    #[tokio::test]
    async fn token_failures() {
        let store = store_with(&[("u1", &[])]).await;
        let ctx = context(store);
        let mut c = Client::open(&ctx);

        c.send(serde_json::json!({"type": "authenticate", "token": "   "})).await;
        assert_eq!(error_parts(c.next().unwrap()), ("token".into(), 400));

        c.send(serde_json::json!({"type": "authenticate", "token": "garbage"})).await;
        assert_eq!(error_parts(c.next().unwrap()), ("token".into(), 401));

        let no_email = sign_claims(
            SECRET,
            &AccessClaims {
                email: None,
                user_id: Some("u1".into()),
                iat: 0,
                exp: chrono::Utc::now().timestamp() + 60,
            },
        )
        .unwrap();
        c.send(serde_json::json!({"type": "authenticate", "token": no_email})).await;
        assert_eq!(error_parts(c.next().unwrap()), ("token".into(), 401));

        let ghost = create_access_token(SECRET, "ghost", "ghost@example.com", 60).unwrap();
        c.send(serde_json::json!({"type": "authenticate", "token": ghost})).await;
        assert_eq!(error_parts(c.next().unwrap()), ("user".into(), 404));

        assert_eq!(c.conn.state(), &ConnState::Connecting);
        // Still usable after failures.
        assert!(matches!(c.login("u1").await, ServerFrame::Authenticated { .. }));
    }

    #[tokio::test]
    async fn malformed_frames_keep_connection_open() {
        let store = store_with(&[("u1", &["general"])]).await;
        let ctx = context(store);
        let mut c = Client::open(&ctx);
        c.login("u1").await;

        c.conn.handle_text("{not json").await;
        assert_eq!(error_parts(c.next().unwrap()), ("payload".into(), 400));
        c.conn.handle_text("[1,2]").await;
        assert_eq!(error_parts(c.next().unwrap()), ("payload".into(), 400));
        c.send(serde_json::json!({"type": 7})).await;
        assert_eq!(error_parts(c.next().unwrap()), ("type".into(), 400));
        c.send(serde_json::json!({"type": "dance"})).await;
        assert_eq!(error_parts(c.next().unwrap()), ("type".into(), 400));
        c.send(serde_json::json!({"type": "send-message", "circleId": "general", "content": ""}))
            .await;
        assert_eq!(error_parts(c.next().unwrap()), ("content".into(), 400));
        c.send(serde_json::json!({"type": "join-circle"})).await;
        assert_eq!(error_parts(c.next().unwrap()), ("circleId".into(), 400));

        assert!(matches!(c.conn.state(), ConnState::Authenticated { .. }));
    }

    #[tokio::test]
    async fn auth_attempts_are_rate_limited_per_address() {
        let store = store_with(&[("u1", &[])]).await;
        let ctx = Arc::new(
            ServerContext::new(store, Arc::new(JwtVerifier::new(SECRET))).with_auth_limit(2),
        );
        let addr: IpAddr = "192.0.2.7".parse().unwrap();
        let mut c = Client::open_from(&ctx, Some(addr));

        for _ in 0..2 {
            c.send(serde_json::json!({"type": "authenticate", "token": "bad"})).await;
            assert_eq!(error_parts(c.next().unwrap()), ("token".into(), 401));
        }
        c.send(serde_json::json!({"type": "authenticate", "token": "bad"})).await;
        assert_eq!(error_parts(c.next().unwrap()), ("token".into(), 429));
    }

    /// Store that fails or stalls every call.
    struct BrokenStore {
        stall: bool,
    }

    impl BrokenStore {
        async fn fail<T>(&self) -> CircleResult<T> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Err(CircleError::Store("connection refused".into()))
        }
    }

    #[async_trait]
    impl CircleStore for BrokenStore {
        async fn find_active_user_by_email(&self, _: &str) -> CircleResult<Option<StoreUser>> {
            self.fail().await
        }
        async fn list_active_memberships(&self, _: &str) -> CircleResult<Vec<String>> {
            self.fail().await
        }
        async fn find_membership(&self, _: &str, _: &str) -> CircleResult<Option<Membership>> {
            self.fail().await
        }
        async fn create_message(&self, _: &str, _: &str, _: &str) -> CircleResult<MessagePayload> {
            self.fail().await
        }
        async fn ensure_circle(&self, _: &str, _: &str) -> CircleResult<String> {
            self.fail().await
        }
    }

    #[tokio::test]
    async fn store_failure_is_reported_as_500() {
        let ctx = context(Arc::new(BrokenStore { stall: false }));
        let mut c = Client::open(&ctx);
        let token = create_access_token(SECRET, "u1", "u1@example.com", 60).unwrap();
        c.send(serde_json::json!({"type": "authenticate", "token": token})).await;
        match c.next().unwrap() {
            ServerFrame::Error { status, field, message, .. } => {
                assert_eq!(status, 500);
                assert_eq!(field, "server");
                assert!(!message.contains("refused"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out() {
        let ctx = Arc::new(
            ServerContext::new(
                Arc::new(BrokenStore { stall: true }),
                Arc::new(JwtVerifier::new(SECRET)),
            )
            .with_store_timeout(Duration::from_millis(50)),
        );
        let mut c = Client::open(&ctx);
        let token = create_access_token(SECRET, "u1", "u1@example.com", 60).unwrap();
        c.send(serde_json::json!({"type": "authenticate", "token": token})).await;
        assert_eq!(error_parts(c.next().unwrap()), ("server".into(), 500));
        assert_eq!(c.conn.state(), &ConnState::Connecting);
    }
}
