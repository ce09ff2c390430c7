//! Session lifecycle and account-level security actions

use agencyos_config::SessionConfig;
use agencyos_rbac::permissions::Requirement;
use agencyos_rbac::{
    with_timeout, AuthContext, Capability, PermissionChecker, PermissionStore, SharedClock, User,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{SecurityError, SecurityResult};

/// Where a session was opened from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
}

/// An authenticated session; `id` is the opaque bearer token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: UserId,
    pub metadata: SessionMetadata,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    fn new(user_id: UserId, metadata: SessionMetadata, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("sess_{}", Uuid::new_v4().simple()),
            user_id,
            metadata,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        (now - self.last_activity_at)
            .to_std()
            .is_ok_and(|idle| idle >= idle_timeout)
    }
}

/// Successful login entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginAuditRecord {
    pub session_id: String,
    pub user_id: UserId,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
    pub logged_at: DateTime<Utc>,
}

/// Account status as reported to the session holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub blocked: bool,
    pub email_confirmed: bool,
}

/// Durable session and login audit records
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> SecurityResult<()>;

    async fn get(&self, token: &str) -> SecurityResult<Option<Session>>;

    /// Update last activity; false when the session no longer exists
    async fn touch(&self, token: &str, at: DateTime<Utc>) -> SecurityResult<bool>;

    async fn list_for_user(&self, user_id: UserId) -> SecurityResult<Vec<Session>>;

    async fn delete(&self, token: &str) -> SecurityResult<bool>;

    /// Delete every session of the user except `keep`; returns how many were removed
    async fn delete_for_user(&self, user_id: UserId, keep: Option<&str>) -> SecurityResult<usize>;

    async fn append_audit(&self, record: LoginAuditRecord) -> SecurityResult<()>;

    async fn list_audit(&self, user_id: UserId) -> SecurityResult<Vec<LoginAuditRecord>>;
}

#[derive(Debug, Default)]
struct SessionRecords {
    sessions: HashMap<String, Session>,
    audit: Vec<LoginAuditRecord>,
}

/// Session store held in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    records: Arc<parking_lot::RwLock<SessionRecords>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) -> SecurityResult<()> {
        self.records
            .write()
            .sessions
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, token: &str) -> SecurityResult<Option<Session>> {
        Ok(self.records.read().sessions.get(token).cloned())
    }

    async fn touch(&self, token: &str, at: DateTime<Utc>) -> SecurityResult<bool> {
        let mut records = self.records.write();
        match records.sessions.get_mut(token) {
            Some(session) => {
                session.last_activity_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_for_user(&self, user_id: UserId) -> SecurityResult<Vec<Session>> {
        let records = self.records.read();
        let mut sessions: Vec<Session> = records
            .sessions
            .values()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(sessions)
    }

    async fn delete(&self, token: &str) -> SecurityResult<bool> {
        Ok(self.records.write().sessions.remove(token).is_some())
    }

    async fn delete_for_user(&self, user_id: UserId, keep: Option<&str>) -> SecurityResult<usize> {
        let mut records = self.records.write();
        let before = records.sessions.len();
        records
            .sessions
            .retain(|token, session| session.user_id != user_id || Some(token.as_str()) == keep);
        Ok(before - records.sessions.len())
    }

    async fn append_audit(&self, record: LoginAuditRecord) -> SecurityResult<()> {
        self.records.write().audit.push(record);
        Ok(())
    }

    async fn list_audit(&self, user_id: UserId) -> SecurityResult<Vec<LoginAuditRecord>> {
        Ok(self
            .records
            .read()
            .audit
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Creates, validates and invalidates sessions; blocks and unblocks accounts.
///
/// Every mutation here is idempotent.
#[derive(Clone)]
pub struct SessionSecurityManager {
    sessions: Arc<dyn SessionStore>,
    checker: PermissionChecker,
    config: SessionConfig,
    clock: SharedClock,
    call_timeout: Duration,
}

impl SessionSecurityManager {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        checker: PermissionChecker,
        config: SessionConfig,
        clock: SharedClock,
        call_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            checker,
            config,
            clock,
            call_timeout,
        }
    }

    fn users(&self) -> &Arc<dyn PermissionStore> {
        self.checker.resolver().store()
    }

    async fn load_user(&self, user_id: UserId) -> SecurityResult<Option<User>> {
        Ok(with_timeout(self.call_timeout, "get_user", self.users().get_user(user_id)).await?)
    }

    /// Open a session for a user whose credentials were just verified
    pub async fn create_session(
        &self,
        user_id: UserId,
        metadata: SessionMetadata,
    ) -> SecurityResult<Session> {
        let session = Session::new(user_id, metadata, self.clock.now());
        with_timeout(
            self.call_timeout,
            "insert_session",
            self.sessions.insert(session.clone()),
        )
        .await?;

        tracing::info!(user_id = %user_id, "Session created");
        Ok(session)
    }

    /// Look up a live session; idle sessions are removed and rejected
    async fn live_session(&self, token: &str) -> SecurityResult<Session> {
        let session = with_timeout(self.call_timeout, "get_session", self.sessions.get(token))
            .await?
            .ok_or(SecurityError::InvalidSession)?;

        if session.is_idle(self.clock.now(), self.config.idle_timeout) {
            with_timeout(self.call_timeout, "delete_session", self.sessions.delete(token)).await?;
            tracing::info!(user_id = %session.user_id, "Idle session expired");
            return Err(SecurityError::InvalidSession);
        }

        Ok(session)
    }

    /// Resolve a bearer token into the caller's context
    pub async fn authenticate(&self, token: &str) -> SecurityResult<AuthContext> {
        let session = self.live_session(token).await?;

        let user = match self.load_user(session.user_id).await? {
            Some(user) if !user.is_blocked => user,
            _ => return Err(SecurityError::InvalidSession),
        };

        let now = self.clock.now();
        with_timeout(self.call_timeout, "touch_session", self.sessions.touch(token, now)).await?;

        Ok(AuthContext::new(user.id, user.email, session.id).authenticated_at(now))
    }

    pub async fn is_session_valid(&self, token: &str) -> SecurityResult<bool> {
        match self.authenticate(token).await {
            Ok(_) => Ok(true),
            Err(SecurityError::InvalidSession) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn check_user_status(&self, token: &str) -> SecurityResult<UserStatus> {
        let session = self.live_session(token).await?;
        let user = self
            .load_user(session.user_id)
            .await?
            .ok_or(SecurityError::InvalidSession)?;

        Ok(UserStatus {
            blocked: user.is_blocked,
            email_confirmed: user.email_confirmed,
        })
    }

    /// Write the login audit entry and refresh the session's activity
    pub async fn log_login_success(
        &self,
        token: &str,
        location: Option<String>,
    ) -> SecurityResult<LoginAuditRecord> {
        let session = self.live_session(token).await?;
        let now = self.clock.now();

        let record = LoginAuditRecord {
            session_id: session.id.clone(),
            user_id: session.user_id,
            ip: session.metadata.ip.clone(),
            user_agent: session.metadata.user_agent.clone(),
            location: location.or(session.metadata.location),
            logged_at: now,
        };

        with_timeout(
            self.call_timeout,
            "append_audit",
            self.sessions.append_audit(record.clone()),
        )
        .await?;
        with_timeout(self.call_timeout, "touch_session", self.sessions.touch(token, now)).await?;

        tracing::info!(
            user_id = %record.user_id,
            ip = record.ip.as_deref().unwrap_or("unknown"),
            "Login success logged"
        );
        Ok(record)
    }

    /// Remove every session of `target`.
    ///
    /// When callers invalidate their own sessions the one making the request
    /// survives if `keep_current_session_on_self_invalidate` is set.
    pub async fn invalidate_all_sessions(
        &self,
        caller: &AuthContext,
        target: UserId,
    ) -> SecurityResult<usize> {
        let keep = if caller.user_id == target {
            self.config
                .keep_current_session_on_self_invalidate
                .then_some(caller.session_id.as_str())
        } else {
            self.checker
                .require_over_user(
                    caller.user_id,
                    target,
                    Requirement::Capability(Capability::CanManageTeam),
                )
                .await?;
            None
        };

        let removed = self.revoke_sessions(target, keep).await?;
        tracing::info!(
            caller = %caller.user_id,
            target = %target,
            removed,
            kept_current = keep.is_some(),
            "Sessions invalidated"
        );
        Ok(removed)
    }

    /// Block an account and end its sessions. Admin-level callers only.
    pub async fn block_user(
        &self,
        caller: UserId,
        target: UserId,
        reason: &str,
    ) -> SecurityResult<User> {
        if caller == target {
            return Err(SecurityError::validation("You cannot block your own account"));
        }
        self.checker
            .require_over_user(caller, target, Requirement::AdminLevel)
            .await?;

        let mut user = self
            .load_user(target)
            .await?
            .ok_or(agencyos_rbac::RbacError::UserNotFound { user_id: target })?;

        if !user.is_blocked {
            user.is_blocked = true;
            user.blocked_reason = Some(reason.to_string());
            user.blocked_at = Some(self.clock.now());
            user = with_timeout(self.call_timeout, "put_user", self.users().put_user(user)).await?;
            tracing::warn!(caller = %caller, target = %target, reason, "User blocked");
        }

        // Runs on repeat calls too, in case a session slipped in between
        self.revoke_sessions(target, None).await?;
        Ok(user)
    }

    /// Lift a block. Admin-level callers only.
    pub async fn unblock_user(&self, caller: UserId, target: UserId) -> SecurityResult<User> {
        self.checker
            .require_over_user(caller, target, Requirement::AdminLevel)
            .await?;

        let mut user = self
            .load_user(target)
            .await?
            .ok_or(agencyos_rbac::RbacError::UserNotFound { user_id: target })?;

        if user.is_blocked {
            user.is_blocked = false;
            user.blocked_reason = None;
            user.blocked_at = None;
            user = with_timeout(self.call_timeout, "put_user", self.users().put_user(user)).await?;
            tracing::info!(caller = %caller, target = %target, "User unblocked");
        }

        Ok(user)
    }

    /// A credential change ends every session of the user, the current one included
    pub async fn on_password_changed(&self, user_id: UserId) -> SecurityResult<usize> {
        let removed = self.revoke_sessions(user_id, None).await?;
        tracing::info!(user_id = %user_id, removed, "Sessions revoked after password change");
        Ok(removed)
    }

    /// Remove sessions without an authorization check; for trusted internal callers
    pub async fn revoke_sessions(&self, user_id: UserId, keep: Option<&str>) -> SecurityResult<usize> {
        with_timeout(
            self.call_timeout,
            "delete_sessions",
            self.sessions.delete_for_user(user_id, keep),
        )
        .await
    }

    /// Remove one session by token
    pub async fn revoke_session(&self, token: &str) -> SecurityResult<bool> {
        with_timeout(self.call_timeout, "delete_session", self.sessions.delete(token)).await
    }

    pub async fn list_sessions(&self, user_id: UserId) -> SecurityResult<Vec<Session>> {
        with_timeout(
            self.call_timeout,
            "list_sessions",
            self.sessions.list_for_user(user_id),
        )
        .await
    }

    pub async fn list_login_audit(&self, user_id: UserId) -> SecurityResult<Vec<LoginAuditRecord>> {
        with_timeout(self.call_timeout, "list_audit", self.sessions.list_audit(user_id)).await
    }
}
