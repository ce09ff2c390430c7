//! Security events delivered over a channel
//!
//! Delivery may repeat or reorder events. Every handler is idempotent and
//! the consumer additionally drops event ids it has already applied.

use agencyos_rbac::{SharedClock, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::alerts::{NewAlert, SecurityAlertPipeline};
use crate::error::{SecurityError, SecurityResult};
use crate::sessions::SessionSecurityManager;

/// How many applied event ids the consumer remembers
const SEEN_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityEventPayload {
    AlertDetected(NewAlert),
    PasswordChanged { user_id: UserId },
    UserBlocked { user_id: UserId, reason: String },
    SessionRevoked { token: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: SecurityEventPayload,
}

impl SecurityEvent {
    pub fn new(payload: SecurityEventPayload, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at,
            payload,
        }
    }

    fn name(&self) -> &'static str {
        match self.payload {
            SecurityEventPayload::AlertDetected(_) => "alert_detected",
            SecurityEventPayload::PasswordChanged { .. } => "password_changed",
            SecurityEventPayload::UserBlocked { .. } => "user_blocked",
            SecurityEventPayload::SessionRevoked { .. } => "session_revoked",
        }
    }
}

/// Sending half handed to detectors
#[derive(Clone)]
pub struct SecurityEventPublisher {
    tx: mpsc::Sender<SecurityEvent>,
    clock: SharedClock,
}

impl SecurityEventPublisher {
    /// Create a publisher and the receiver a consumer will drain
    pub fn channel(
        capacity: usize,
        clock: SharedClock,
    ) -> (Self, mpsc::Receiver<SecurityEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, clock }, rx)
    }

    pub async fn publish(&self, payload: SecurityEventPayload) -> SecurityResult<Uuid> {
        let event = SecurityEvent::new(payload, self.clock.now());
        let id = event.id;
        self.send(event).await?;
        Ok(id)
    }

    /// Send a prepared event; redelivering the same event is allowed
    pub async fn send(&self, event: SecurityEvent) -> SecurityResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| SecurityError::ChannelClosed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Duplicate,
}

/// Bounded memory of applied event ids
#[derive(Debug, Default)]
struct SeenEvents {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
}

impl SeenEvents {
    fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: Uuid) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > SEEN_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }
}

/// Applies security events to the alert feed and the session store
pub struct SecurityEventConsumer {
    alerts: SecurityAlertPipeline,
    sessions: SessionSecurityManager,
    seen: SeenEvents,
}

impl SecurityEventConsumer {
    pub fn new(alerts: SecurityAlertPipeline, sessions: SessionSecurityManager) -> Self {
        Self {
            alerts,
            sessions,
            seen: SeenEvents::default(),
        }
    }

    /// Apply one event. Failed events are not marked seen, so redelivery retries them.
    pub async fn handle(&mut self, event: SecurityEvent) -> SecurityResult<EventOutcome> {
        if self.seen.contains(&event.id) {
            debug!(event_id = %event.id, event = event.name(), "Duplicate security event dropped");
            return Ok(EventOutcome::Duplicate);
        }

        match &event.payload {
            SecurityEventPayload::AlertDetected(alert) => {
                // The event id doubles as the alert id
                let alert = alert.clone().with_id(event.id);
                self.alerts.record_alert(alert).await?;
            }
            SecurityEventPayload::PasswordChanged { user_id } => {
                self.sessions.on_password_changed(*user_id).await?;
            }
            SecurityEventPayload::UserBlocked { user_id, reason } => {
                let removed = self.sessions.revoke_sessions(*user_id, None).await?;
                info!(user_id = %user_id, reason = %reason, removed, "Sessions revoked for blocked user");
            }
            SecurityEventPayload::SessionRevoked { token } => {
                self.sessions.revoke_session(token).await?;
            }
        }

        self.seen.insert(event.id);
        Ok(EventOutcome::Applied)
    }

    /// Drain the channel until every publisher is dropped
    pub async fn run(mut self, mut rx: mpsc::Receiver<SecurityEvent>) {
        info!("Security event consumer started");
        while let Some(event) = rx.recv().await {
            let event_id = event.id;
            let name = event.name();
            if let Err(e) = self.handle(event).await {
                error!(event_id = %event_id, event = name, "Failed to apply security event: {}", e);
            }
        }
        info!("Security event consumer stopped");
    }
}
