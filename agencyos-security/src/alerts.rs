//! Security alert feed and resolution workflow
//!
//! Detectors append alerts without any authorization gate. Reading and
//! resolving them is gated: the whole feed needs super admin, a tenant's
//! slice needs `can_view_security` in that tenant.

use agencyos_rbac::{
    with_timeout, Capability, PermissionChecker, SharedClock, TenantId, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{SecurityError, SecurityResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventType {
    AbuseAttempt,
    SuspiciousLogin,
    DeletionRequest,
    UnauthorizedAccess,
}

impl AlertEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertEventType::AbuseAttempt => "abuse_attempt",
            AlertEventType::SuspiciousLogin => "suspicious_login",
            AlertEventType::DeletionRequest => "deletion_request",
            AlertEventType::UnauthorizedAccess => "unauthorized_access",
        }
    }
}

impl fmt::Display for AlertEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertResolution {
    pub resolved_by: UserId,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: Uuid,
    pub event_type: AlertEventType,
    pub severity: AlertSeverity,
    pub detail: serde_json::Value,
    pub tenant_id: Option<TenantId>,
    pub user_id: Option<UserId>,
    pub detected_at: DateTime<Utc>,
    pub resolution: Option<AlertResolution>,
}

impl SecurityAlert {
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Alert as submitted by a detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    /// Caller-chosen id makes redelivery of the same alert a no-op
    pub id: Option<Uuid>,
    pub event_type: AlertEventType,
    pub severity: AlertSeverity,
    pub detail: serde_json::Value,
    pub tenant_id: Option<TenantId>,
    pub user_id: Option<UserId>,
}

impl NewAlert {
    pub fn new(event_type: AlertEventType, severity: AlertSeverity, detail: serde_json::Value) -> Self {
        Self {
            id: None,
            event_type,
            severity,
            detail,
            tenant_id: None,
            user_id: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn for_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Which alerts a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "tenant_id", rename_all = "snake_case")]
pub enum AlertScope {
    All,
    Tenant(TenantId),
}

impl AlertScope {
    pub fn includes(&self, alert: &SecurityAlert) -> bool {
        match self {
            AlertScope::All => true,
            AlertScope::Tenant(tenant_id) => alert.tenant_id == Some(*tenant_id),
        }
    }
}

/// Append-only alert records with an atomic resolve
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert; an alert whose id already exists is returned unchanged
    async fn insert(&self, alert: SecurityAlert) -> SecurityResult<SecurityAlert>;

    async fn get(&self, alert_id: Uuid) -> SecurityResult<Option<SecurityAlert>>;

    /// Newest first
    async fn list(&self, scope: AlertScope) -> SecurityResult<Vec<SecurityAlert>>;

    /// Set the resolution if none is set yet; `None` for unknown ids
    async fn resolve(
        &self,
        alert_id: Uuid,
        resolution: AlertResolution,
    ) -> SecurityResult<Option<SecurityAlert>>;
}

/// Alerts held in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryAlertStore {
    alerts: Arc<parking_lot::RwLock<Vec<SecurityAlert>>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn insert(&self, alert: SecurityAlert) -> SecurityResult<SecurityAlert> {
        let mut alerts = self.alerts.write();
        if let Some(existing) = alerts.iter().find(|existing| existing.id == alert.id) {
            return Ok(existing.clone());
        }
        alerts.push(alert.clone());
        Ok(alert)
    }

    async fn get(&self, alert_id: Uuid) -> SecurityResult<Option<SecurityAlert>> {
        Ok(self
            .alerts
            .read()
            .iter()
            .find(|alert| alert.id == alert_id)
            .cloned())
    }

    async fn list(&self, scope: AlertScope) -> SecurityResult<Vec<SecurityAlert>> {
        let mut alerts: Vec<SecurityAlert> = self
            .alerts
            .read()
            .iter()
            .filter(|alert| scope.includes(alert))
            .cloned()
            .collect();
        // Stable sort keeps later inserts first among equal timestamps
        alerts.reverse();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(alerts)
    }

    async fn resolve(
        &self,
        alert_id: Uuid,
        resolution: AlertResolution,
    ) -> SecurityResult<Option<SecurityAlert>> {
        let mut alerts = self.alerts.write();
        Ok(alerts
            .iter_mut()
            .find(|alert| alert.id == alert_id)
            .map(|alert| {
                if alert.resolution.is_none() {
                    alert.resolution = Some(resolution);
                }
                alert.clone()
            }))
    }
}

/// Records anomalies and exposes the resolution workflow
#[derive(Clone)]
pub struct SecurityAlertPipeline {
    store: Arc<dyn AlertStore>,
    checker: PermissionChecker,
    clock: SharedClock,
    call_timeout: Duration,
}

impl SecurityAlertPipeline {
    pub fn new(
        store: Arc<dyn AlertStore>,
        checker: PermissionChecker,
        clock: SharedClock,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            checker,
            clock,
            call_timeout,
        }
    }

    /// Append an alert; no authorization gate
    pub async fn record_alert(&self, new_alert: NewAlert) -> SecurityResult<SecurityAlert> {
        let alert = SecurityAlert {
            id: new_alert.id.unwrap_or_else(Uuid::new_v4),
            event_type: new_alert.event_type,
            severity: new_alert.severity,
            detail: new_alert.detail,
            tenant_id: new_alert.tenant_id,
            user_id: new_alert.user_id,
            detected_at: self.clock.now(),
            resolution: None,
        };

        let saved = with_timeout(self.call_timeout, "insert_alert", self.store.insert(alert)).await?;

        if saved.severity == AlertSeverity::High {
            tracing::warn!(
                alert_id = %saved.id,
                event_type = %saved.event_type,
                severity = %saved.severity,
                tenant_id = ?saved.tenant_id,
                user_id = ?saved.user_id,
                "Security alert recorded"
            );
        } else {
            tracing::info!(
                alert_id = %saved.id,
                event_type = %saved.event_type,
                severity = %saved.severity,
                tenant_id = ?saved.tenant_id,
                "Security alert recorded"
            );
        }
        Ok(saved)
    }

    async fn authorize_scope(&self, caller: UserId, scope: AlertScope) -> SecurityResult<()> {
        match scope {
            AlertScope::All => self.checker.require_super_admin(caller).await?,
            AlertScope::Tenant(tenant_id) => {
                self.checker
                    .require(caller, tenant_id, Capability::CanViewSecurity)
                    .await?;
            }
        }
        Ok(())
    }

    /// Alerts in `scope`, newest first
    pub async fn list_alerts(
        &self,
        caller: UserId,
        scope: AlertScope,
    ) -> SecurityResult<Vec<SecurityAlert>> {
        self.authorize_scope(caller, scope).await?;
        with_timeout(self.call_timeout, "list_alerts", self.store.list(scope)).await
    }

    /// Number of unresolved alerts in `scope`
    pub async fn unresolved_count(&self, caller: UserId, scope: AlertScope) -> SecurityResult<usize> {
        Ok(self
            .list_alerts(caller, scope)
            .await?
            .iter()
            .filter(|alert| !alert.is_resolved())
            .count())
    }

    /// Mark an alert resolved. Resolving twice is a successful no-op.
    pub async fn resolve_alert(&self, caller: UserId, alert_id: Uuid) -> SecurityResult<SecurityAlert> {
        let alert = with_timeout(self.call_timeout, "get_alert", self.store.get(alert_id))
            .await?
            .ok_or(SecurityError::AlertNotFound { alert_id })?;

        let scope = alert.tenant_id.map_or(AlertScope::All, AlertScope::Tenant);
        self.authorize_scope(caller, scope).await?;

        if alert.is_resolved() {
            return Ok(alert);
        }

        let resolution = AlertResolution {
            resolved_by: caller,
            resolved_at: self.clock.now(),
        };
        let resolved = with_timeout(
            self.call_timeout,
            "resolve_alert",
            self.store.resolve(alert_id, resolution),
        )
        .await?
        .ok_or(SecurityError::AlertNotFound { alert_id })?;

        tracing::info!(alert_id = %alert_id, resolved_by = %caller, "Security alert resolved");
        Ok(resolved)
    }

    /// Repeated failed logins crossed the lockout threshold
    pub async fn record_abuse_attempt(
        &self,
        identifier: &str,
        attempts: u32,
        ip: Option<&str>,
    ) -> SecurityResult<SecurityAlert> {
        self.record_alert(NewAlert::new(
            AlertEventType::AbuseAttempt,
            AlertSeverity::High,
            json!({
                "identifier": identifier,
                "attempts": attempts,
                "ip": ip,
            }),
        ))
        .await
    }

    /// Login from an unusual origin
    pub async fn record_suspicious_login(
        &self,
        user_id: UserId,
        tenant_id: Option<TenantId>,
        detail: serde_json::Value,
    ) -> SecurityResult<SecurityAlert> {
        let mut alert =
            NewAlert::new(AlertEventType::SuspiciousLogin, AlertSeverity::Medium, detail)
                .for_user(user_id);
        alert.tenant_id = tenant_id;
        self.record_alert(alert).await
    }

    /// Caller tried an action it lacks the capability for
    pub async fn record_unauthorized_access(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        action: &str,
    ) -> SecurityResult<SecurityAlert> {
        self.record_alert(
            NewAlert::new(
                AlertEventType::UnauthorizedAccess,
                AlertSeverity::Medium,
                json!({ "action": action }),
            )
            .for_user(user_id)
            .for_tenant(tenant_id),
        )
        .await
    }

    /// A member asked for data deletion
    pub async fn record_deletion_request(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        entity: &str,
        entity_id: &str,
    ) -> SecurityResult<SecurityAlert> {
        self.record_alert(
            NewAlert::new(
                AlertEventType::DeletionRequest,
                AlertSeverity::Low,
                json!({ "entity": entity, "entity_id": entity_id }),
            )
            .for_user(user_id)
            .for_tenant(tenant_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agencyos_rbac::{
        DerivedPermissionResolver, InMemoryPermissionStore, ManualClock, Membership,
        PermissionStore, Role, User, UserPermissionOverride,
    };

    struct Fixture {
        users: Arc<InMemoryPermissionStore>,
        clock: Arc<ManualClock>,
        pipeline: SecurityAlertPipeline,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(InMemoryPermissionStore::new());
        let clock = ManualClock::starting_now();
        let pipeline = SecurityAlertPipeline::new(
            Arc::new(InMemoryAlertStore::new()),
            PermissionChecker::new(DerivedPermissionResolver::new(
                users.clone(),
                Duration::from_secs(1),
            )),
            clock.clone(),
            Duration::from_secs(1),
        );
        Fixture {
            users,
            clock,
            pipeline,
        }
    }

    async fn super_admin(users: &InMemoryPermissionStore) -> UserId {
        let user = users.put_user(User::new("root@agency.test")).await.unwrap();
        users
            .put_override(UserPermissionOverride::super_admin(user.id))
            .await
            .unwrap();
        user.id
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let fx = fixture();
        let root = super_admin(&fx.users).await;
        let alert = fx
            .pipeline
            .record_abuse_attempt("a@x.com", 5, Some("1.2.3.4"))
            .await
            .unwrap();

        let first = fx.pipeline.resolve_alert(root, alert.id).await.unwrap();
        let resolved_at = first.resolution.as_ref().unwrap().resolved_at;

        fx.clock.advance(Duration::from_secs(30));
        let second = fx.pipeline.resolve_alert(root, alert.id).await.unwrap();
        assert_eq!(second.resolution.unwrap().resolved_at, resolved_at);

        assert!(matches!(
            fx.pipeline.resolve_alert(root, Uuid::new_v4()).await,
            Err(SecurityError::AlertNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_listing_is_newest_first_and_counts_unresolved() {
        let fx = fixture();
        let root = super_admin(&fx.users).await;

        let mut ids = Vec::new();
        for n in 0..4 {
            let alert = fx
                .pipeline
                .record_abuse_attempt(&format!("user{}@x.com", n), 5, None)
                .await
                .unwrap();
            ids.push(alert.id);
            fx.clock.advance(Duration::from_secs(1));
        }
        fx.pipeline.resolve_alert(root, ids[1]).await.unwrap();

        let listed = fx.pipeline.list_alerts(root, AlertScope::All).await.unwrap();
        let listed_ids: Vec<Uuid> = listed.iter().map(|alert| alert.id).collect();
        let mut expected = ids.clone();
        expected.reverse();
        assert_eq!(listed_ids, expected);

        assert_eq!(
            fx.pipeline.unresolved_count(root, AlertScope::All).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_tenant_scope_requires_view_security() {
        let fx = fixture();
        let tenant = TenantId::new();
        let owner = fx.users.put_user(User::new("owner@agency.test")).await.unwrap();
        let viewer = fx.users.put_user(User::new("viewer@agency.test")).await.unwrap();
        for (user, role) in [(&owner, Role::Owner), (&viewer, Role::Viewer)] {
            fx.users
                .replace_membership(Membership::new(user.id, tenant, role))
                .await
                .unwrap();
        }

        fx.pipeline
            .record_unauthorized_access(viewer.id, tenant, "can_manage_billing")
            .await
            .unwrap();
        fx.pipeline
            .record_abuse_attempt("elsewhere@x.com", 5, None)
            .await
            .unwrap();

        let visible = fx
            .pipeline
            .list_alerts(owner.id, AlertScope::Tenant(tenant))
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].event_type, AlertEventType::UnauthorizedAccess);

        assert!(fx.pipeline.list_alerts(owner.id, AlertScope::All).await.is_err());
        assert!(fx
            .pipeline
            .list_alerts(viewer.id, AlertScope::Tenant(tenant))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_same_id_recorded_once() {
        let fx = fixture();
        let root = super_admin(&fx.users).await;
        let id = Uuid::new_v4();
        let alert = NewAlert::new(
            AlertEventType::SuspiciousLogin,
            AlertSeverity::Medium,
            json!({ "country": "NZ" }),
        )
        .with_id(id);

        fx.pipeline.record_alert(alert.clone()).await.unwrap();
        fx.pipeline.record_alert(alert).await.unwrap();
        assert_eq!(
            fx.pipeline.list_alerts(root, AlertScope::All).await.unwrap().len(),
            1
        );
    }
}
