//! Authentication context carried through a request

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RbacResult;
use crate::models::{Capability, TenantId, UserId};
use crate::resolver::{DerivedPermissionSet, RequestPermissionCache};

/// Authenticated caller of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    /// User ID
    pub user_id: UserId,

    pub email: String,

    /// Session token the request was authenticated with
    pub session_id: String,

    /// Tenant the request operates in, if any
    pub current_tenant_id: Option<TenantId>,

    pub authenticated_at: DateTime<Utc>,
}

impl AuthContext {
    /// Create a new authentication context
    pub fn new(user_id: UserId, email: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            session_id: session_id.into(),
            current_tenant_id: None,
            authenticated_at: Utc::now(),
        }
    }

    /// Scope the context to a tenant
    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.current_tenant_id = Some(tenant_id);
        self
    }

    pub fn authenticated_at(mut self, at: DateTime<Utc>) -> Self {
        self.authenticated_at = at;
        self
    }

    /// Whether `token` is the session this context came from
    pub fn is_current_session(&self, token: &str) -> bool {
        self.session_id == token
    }

    /// Derived permissions in the current tenant, memoized for the request
    pub async fn permissions(
        &self,
        cache: &RequestPermissionCache,
    ) -> RbacResult<Option<DerivedPermissionSet>> {
        match self.current_tenant_id {
            Some(tenant_id) => Ok(Some(cache.resolve(self.user_id, tenant_id).await?)),
            None => Ok(None),
        }
    }

    /// Capability check in the current tenant; false outside any tenant
    pub async fn can(&self, cache: &RequestPermissionCache, capability: Capability) -> RbacResult<bool> {
        Ok(self
            .permissions(cache)
            .await?
            .is_some_and(|derived| derived.has(capability)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPermissionStore;
    use crate::models::{Membership, Role};
    use crate::resolver::DerivedPermissionResolver;
    use crate::store::PermissionStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_auth_context_creation() {
        let user = UserId::new();
        let context = AuthContext::new(user, "a@agency.test", "tok_1");
        assert_eq!(context.user_id, user);
        assert!(context.current_tenant_id.is_none());
        assert!(context.is_current_session("tok_1"));
        assert!(!context.is_current_session("tok_2"));
    }

    #[tokio::test]
    async fn test_tenant_scoped_capabilities() {
        let store = Arc::new(InMemoryPermissionStore::new());
        let user = UserId::new();
        let tenant = TenantId::new();
        store
            .replace_membership(Membership::new(user, tenant, Role::Owner))
            .await
            .unwrap();
        let cache = RequestPermissionCache::new(DerivedPermissionResolver::new(
            store,
            Duration::from_secs(1),
        ));

        let unscoped = AuthContext::new(user, "o@agency.test", "tok");
        assert!(!unscoped.can(&cache, Capability::CanManageBilling).await.unwrap());

        let scoped = unscoped.with_tenant(tenant);
        assert!(scoped.can(&cache, Capability::CanManageBilling).await.unwrap());
    }
}
