//! Facade every external caller goes through
//!
//! Operations taking a session token resolve it first and fail with an
//! authentication error before any business rule runs. Every operation
//! returns [`ServiceResult`], so only classified errors leave this module.
//! Security-relevant mutations run in a spawned task that is awaited, which
//! keeps them going if the caller's future is dropped mid-flight.

use agencyos_config::AgencyConfig;
use agencyos_errors::{ClassifyResult, ServiceResult};
use agencyos_rbac::{
    with_timeout, AuthContext, Capability, CapabilityPatch, DerivedPermissionResolver,
    DerivedPermissionSet, InMemoryPermissionStore, Membership, PermissionChecker, PermissionStore,
    RbacConfig, Role, RoleTemplate, RoleTemplateManager, SharedClock, TenantId, User, UserId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::alerts::{AlertScope, AlertStore, InMemoryAlertStore, SecurityAlert, SecurityAlertPipeline};
use crate::error::{SecurityError, SecurityResult};
use crate::login_guard::{AttemptStore, InMemoryAttemptStore, LoginGuard, RateLimitDecision};
use crate::sessions::{
    InMemorySessionStore, LoginAuditRecord, Session, SessionMetadata, SessionSecurityManager,
    SessionStore, UserStatus,
};

/// Checks an email/password pair against the identity provider
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(None)` when the pair does not match any account
    async fn verify(&self, email: &str, password: &str) -> SecurityResult<Option<UserId>>;
}

/// Credential table held in process memory, for development and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialVerifier {
    credentials: Arc<parking_lot::RwLock<HashMap<String, (String, UserId)>>>,
}

impl InMemoryCredentialVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, email: &str, password: &str, user_id: UserId) {
        self.credentials
            .write()
            .insert(email.trim().to_lowercase(), (password.to_string(), user_id));
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryCredentialVerifier {
    async fn verify(&self, email: &str, password: &str) -> SecurityResult<Option<UserId>> {
        Ok(self
            .credentials
            .read()
            .get(&email.trim().to_lowercase())
            .filter(|(stored, _)| stored == password)
            .map(|(_, user_id)| *user_id))
    }
}

/// Storage backends the facade is wired to
#[derive(Clone)]
pub struct SecurityStores {
    pub permissions: Arc<dyn PermissionStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub alerts: Arc<dyn AlertStore>,
}

impl SecurityStores {
    pub fn in_memory() -> Self {
        Self {
            permissions: Arc::new(InMemoryPermissionStore::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
            attempts: Arc::new(InMemoryAttemptStore::new()),
            alerts: Arc::new(InMemoryAlertStore::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            ip: None,
            user_agent: None,
            location: None,
        }
    }

    pub fn from_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub session: Session,
    pub audit: LoginAuditRecord,
}

/// Run a mutation to completion even if the caller stops polling
async fn run_detached<T, F>(mutation: F) -> SecurityResult<T>
where
    T: Send + 'static,
    F: Future<Output = SecurityResult<T>> + Send + 'static,
{
    tokio::spawn(mutation).await?
}

/// Authorization and account-security service
#[derive(Clone)]
pub struct SecurityService {
    config: Arc<AgencyConfig>,
    resolver: DerivedPermissionResolver,
    checker: PermissionChecker,
    templates: RoleTemplateManager,
    guard: LoginGuard,
    sessions: SessionSecurityManager,
    alerts: SecurityAlertPipeline,
    verifier: Arc<dyn CredentialVerifier>,
}

impl SecurityService {
    /// Wire every component; installs the default role templates when configured
    pub async fn new(
        config: AgencyConfig,
        stores: SecurityStores,
        verifier: Arc<dyn CredentialVerifier>,
        clock: SharedClock,
    ) -> ServiceResult<Self> {
        let call_timeout = config.store.call_timeout;
        let rbac_config = RbacConfig {
            store_call_timeout: call_timeout,
            seed_default_templates: config.store.seed_default_templates,
            ..RbacConfig::default()
        };
        rbac_config.validate().classified()?;

        let resolver = DerivedPermissionResolver::new(stores.permissions, call_timeout);
        let checker = PermissionChecker::new(resolver.clone());
        let templates =
            RoleTemplateManager::new(checker.clone(), Arc::new(rbac_config), clock.clone());
        if config.store.seed_default_templates {
            let seeded = templates.seed_defaults().await.classified()?;
            tracing::debug!(seeded, "Role templates seeded");
        }

        let guard = LoginGuard::new(
            stores.attempts,
            config.login_guard.clone(),
            clock.clone(),
            call_timeout,
        );
        let sessions = SessionSecurityManager::new(
            stores.sessions,
            checker.clone(),
            config.session.clone(),
            clock.clone(),
            call_timeout,
        );
        let alerts = SecurityAlertPipeline::new(stores.alerts, checker.clone(), clock, call_timeout);

        tracing::info!(
            max_attempts = config.login_guard.max_attempts,
            lockout_seconds = config.login_guard.lockout_duration.as_secs(),
            "Security service initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            resolver,
            checker,
            templates,
            guard,
            sessions,
            alerts,
            verifier,
        })
    }

    pub fn config(&self) -> &AgencyConfig {
        &self.config
    }

    pub fn permission_store(&self) -> &Arc<dyn PermissionStore> {
        self.resolver.store()
    }

    pub fn resolver(&self) -> &DerivedPermissionResolver {
        &self.resolver
    }

    pub fn checker(&self) -> &PermissionChecker {
        &self.checker
    }

    pub fn sessions(&self) -> &SessionSecurityManager {
        &self.sessions
    }

    pub fn alerts(&self) -> &SecurityAlertPipeline {
        &self.alerts
    }

    pub fn login_guard(&self) -> &LoginGuard {
        &self.guard
    }

    /// Resolve a bearer token into the caller's context
    pub async fn authenticate(&self, token: &str) -> ServiceResult<AuthContext> {
        self.caller(token).await.classified()
    }

    async fn caller(&self, token: &str) -> SecurityResult<AuthContext> {
        if token.trim().is_empty() {
            return Err(SecurityError::InvalidSession);
        }
        self.sessions.authenticate(token).await
    }

    /// The caller's effective capabilities in `tenant_id`
    pub async fn derived_permissions(
        &self,
        token: &str,
        tenant_id: TenantId,
    ) -> ServiceResult<DerivedPermissionSet> {
        let caller = self.caller(token).await.classified()?;
        self.resolver
            .resolve(caller.user_id, tenant_id)
            .await
            .classified()
    }

    /// Whether the caller holds `capability` in `tenant_id`
    pub async fn has_permission(
        &self,
        token: &str,
        tenant_id: TenantId,
        capability: Capability,
    ) -> ServiceResult<bool> {
        let caller = self.caller(token).await.classified()?;
        self.checker
            .check(caller.user_id, tenant_id, capability)
            .await
            .classified()
    }

    pub async fn check_rate_limit(
        &self,
        email: &str,
        ip: Option<&str>,
    ) -> ServiceResult<RateLimitDecision> {
        self.guard.check_rate_limit(email, ip).await.classified()
    }

    /// Count a failed login; an `abuse_attempt` alert is raised when a counter locks
    pub async fn record_failed_login(
        &self,
        email: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> ServiceResult<RateLimitDecision> {
        self.failed_login(email, ip, user_agent).await.classified()
    }

    async fn failed_login(
        &self,
        email: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> SecurityResult<RateLimitDecision> {
        let guard = self.guard.clone();
        let alerts = self.alerts.clone();
        let email = email.to_string();
        let ip = ip.map(str::to_string);
        let user_agent = user_agent.map(str::to_string);

        run_detached(async move {
            let outcome = guard
                .record_failed_login(&email, ip.as_deref(), user_agent.as_deref())
                .await?;

            if !outcome.newly_locked.is_empty() && guard.policy().alert_on_lockout {
                let attempts = outcome
                    .decision
                    .email_attempts
                    .max(outcome.decision.ip_attempts);
                let identifier = outcome
                    .newly_locked
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                alerts
                    .record_abuse_attempt(&identifier, attempts, ip.as_deref())
                    .await?;
            }

            Ok(outcome.decision)
        })
        .await
    }

    /// Status of the session holder; a blocked user still gets an answer while the session lives
    pub async fn check_user_status(&self, token: &str) -> ServiceResult<UserStatus> {
        if token.trim().is_empty() {
            return Err(SecurityError::InvalidSession).classified();
        }
        self.sessions.check_user_status(token).await.classified()
    }

    pub async fn log_login_success(
        &self,
        token: &str,
        location: Option<String>,
    ) -> ServiceResult<LoginAuditRecord> {
        self.caller(token).await.classified()?;
        self.sessions
            .log_login_success(token, location)
            .await
            .classified()
    }

    /// Full login: lockout check, credential check, session creation and audit
    pub async fn login(&self, request: LoginRequest) -> ServiceResult<LoginResponse> {
        self.try_login(request).await.classified()
    }

    async fn try_login(&self, request: LoginRequest) -> SecurityResult<LoginResponse> {
        let ip = request.ip.as_deref();
        // Check-then-verify is not serialized: a concurrent burst against an open
        // counter is verified in full before the lockout lands. Every failure
        // is still counted.
        self.guard.ensure_allowed(&request.email, ip).await?;

        let verified = with_timeout(
            self.config.store.call_timeout,
            "verify_credentials",
            self.verifier.verify(&request.email, &request.password),
        )
        .await?;
        let user = match verified {
            Some(user_id) => self.load_user(user_id).await?,
            None => None,
        };

        let Some(user) = user else {
            self.failed_login(&request.email, ip, request.user_agent.as_deref())
                .await?;
            return Err(SecurityError::InvalidCredentials);
        };

        if user.is_blocked {
            tracing::warn!(user_id = %user.id, "Login attempt for blocked account");
            return Err(SecurityError::AccountBlocked);
        }

        self.guard.record_successful_login(&request.email).await?;
        let session = self
            .sessions
            .create_session(
                user.id,
                SessionMetadata {
                    ip: request.ip.clone(),
                    user_agent: request.user_agent.clone(),
                    location: request.location.clone(),
                },
            )
            .await?;
        let audit = self
            .sessions
            .log_login_success(&session.id, request.location)
            .await?;

        Ok(LoginResponse {
            user_id: user.id,
            session,
            audit,
        })
    }

    async fn load_user(&self, user_id: UserId) -> SecurityResult<Option<User>> {
        Ok(with_timeout(
            self.config.store.call_timeout,
            "get_user",
            self.permission_store().get_user(user_id),
        )
        .await?)
    }

    /// End every session of `target`; returns how many were removed
    pub async fn invalidate_all_sessions(&self, token: &str, target: UserId) -> ServiceResult<usize> {
        let caller = self.caller(token).await.classified()?;
        let sessions = self.sessions.clone();
        run_detached(async move { sessions.invalidate_all_sessions(&caller, target).await })
            .await
            .classified()
    }

    /// Report a completed credential change; every session of the caller ends
    pub async fn change_password_completed(&self, token: &str) -> ServiceResult<usize> {
        let caller = self.caller(token).await.classified()?;
        let sessions = self.sessions.clone();
        run_detached(async move { sessions.on_password_changed(caller.user_id).await })
            .await
            .classified()
    }

    pub async fn block_user(&self, token: &str, target: UserId, reason: &str) -> ServiceResult<User> {
        let caller = self.caller(token).await.classified()?;
        let sessions = self.sessions.clone();
        let reason = reason.to_string();
        run_detached(async move { sessions.block_user(caller.user_id, target, &reason).await })
            .await
            .classified()
    }

    pub async fn unblock_user(&self, token: &str, target: UserId) -> ServiceResult<User> {
        let caller = self.caller(token).await.classified()?;
        let sessions = self.sessions.clone();
        run_detached(async move { sessions.unblock_user(caller.user_id, target).await })
            .await
            .classified()
    }

    pub async fn update_member_role(
        &self,
        token: &str,
        target: UserId,
        new_role: Role,
        tenant_id: TenantId,
    ) -> ServiceResult<Membership> {
        let caller = self.caller(token).await.classified()?;
        self.templates
            .assign_role(caller.user_id, target, new_role, tenant_id)
            .await
            .classified()
    }

    pub async fn update_role_template(
        &self,
        token: &str,
        role: Role,
        patch: &CapabilityPatch,
    ) -> ServiceResult<RoleTemplate> {
        let caller = self.caller(token).await.classified()?;
        self.templates
            .update_template(caller.user_id, role, patch)
            .await
            .classified()
    }

    pub async fn list_role_templates(&self) -> ServiceResult<Vec<RoleTemplate>> {
        self.templates.list_templates().await.classified()
    }

    pub async fn list_security_alerts(
        &self,
        token: &str,
        scope: AlertScope,
    ) -> ServiceResult<Vec<SecurityAlert>> {
        let caller = self.caller(token).await.classified()?;
        self.alerts
            .list_alerts(caller.user_id, scope)
            .await
            .classified()
    }

    pub async fn resolve_alert(&self, token: &str, alert_id: Uuid) -> ServiceResult<SecurityAlert> {
        let caller = self.caller(token).await.classified()?;
        let alerts = self.alerts.clone();
        run_detached(async move { alerts.resolve_alert(caller.user_id, alert_id).await })
            .await
            .classified()
    }

    pub async fn unresolved_alert_count(&self, token: &str, scope: AlertScope) -> ServiceResult<usize> {
        let caller = self.caller(token).await.classified()?;
        self.alerts
            .unresolved_count(caller.user_id, scope)
            .await
            .classified()
    }
}
