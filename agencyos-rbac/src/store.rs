//! Permission store abstraction
//!
//! The durable record of users, memberships, overrides and role templates is
//! owned by an external service. Everything in this crate talks to it through
//! [`PermissionStore`] and bounds each call with [`with_timeout`].

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::error::RbacResult;
use crate::models::{
    Membership, Role, RoleTemplate, TenantId, User, UserId, UserPermissionOverride,
};

/// A store call ran past its deadline
#[derive(Error, Debug, Clone)]
#[error("store call '{operation}' timed out after {limit:?}")]
pub struct StoreTimeout {
    pub operation: &'static str,
    pub limit: Duration,
}

/// Run a store call with a deadline
pub async fn with_timeout<T, E, F>(limit: Duration, operation: &'static str, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<StoreTimeout>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "Store call timed out");
            Err(StoreTimeout { operation, limit }.into())
        }
    }
}

/// Everything the resolver needs for one (user, tenant) pair
#[derive(Debug, Clone, Default)]
pub struct PermissionInputs {
    pub membership: Option<Membership>,
    pub override_flags: Option<UserPermissionOverride>,
    /// Template for the membership role; tenant-owned wins over global
    pub template: Option<RoleTemplate>,
}

/// Durable permission records
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> RbacResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> RbacResult<Option<User>>;

    async fn put_user(&self, user: User) -> RbacResult<User>;

    async fn get_membership(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> RbacResult<Option<Membership>>;

    async fn list_memberships(&self, user_id: UserId) -> RbacResult<Vec<Membership>>;

    /// Write the single membership row for (user, tenant), replacing any prior role
    async fn replace_membership(&self, membership: Membership) -> RbacResult<Membership>;

    async fn get_override(&self, user_id: UserId) -> RbacResult<Option<UserPermissionOverride>>;

    async fn put_override(
        &self,
        override_flags: UserPermissionOverride,
    ) -> RbacResult<UserPermissionOverride>;

    /// Template for a role; `tenant_id` selects a tenant-owned template if present
    async fn get_template(
        &self,
        role: Role,
        tenant_id: Option<TenantId>,
    ) -> RbacResult<Option<RoleTemplate>>;

    async fn list_templates(&self) -> RbacResult<Vec<RoleTemplate>>;

    async fn put_template(&self, template: RoleTemplate) -> RbacResult<RoleTemplate>;

    /// Load resolver inputs; stores with a joined query should override this
    async fn load_permission_inputs(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> RbacResult<PermissionInputs> {
        let override_flags = self.get_override(user_id).await?;
        let membership = self.get_membership(user_id, tenant_id).await?;

        let template = match &membership {
            Some(membership) => self.get_template(membership.role, Some(tenant_id)).await?,
            None => None,
        };

        Ok(PermissionInputs {
            membership,
            override_flags,
            template,
        })
    }
}
