//! Authorization gate
//!
//! Every administrative operation checks its caller here. The caller's
//! account is loaded first: a blocked or unknown account is denied before
//! any capability is looked at.

use crate::{
    error::{RbacError, RbacResult},
    models::{Capability, TenantId, User, UserId},
    resolver::{DerivedPermissionResolver, DerivedPermissionSet},
    store::with_timeout,
};

/// What a caller must hold to act on another user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// A capability flag in a shared tenant
    Capability(Capability),
    /// Owner/admin escalation in a shared tenant
    AdminLevel,
}

impl Requirement {
    fn is_met_by(&self, derived: &DerivedPermissionSet) -> bool {
        match self {
            Requirement::Capability(capability) => derived.has(*capability),
            Requirement::AdminLevel => derived.is_admin_level(),
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Requirement::Capability(capability) => capability.as_str(),
            Requirement::AdminLevel => "admin",
        }
    }
}

/// Permission checker for validating user actions
#[derive(Clone)]
pub struct PermissionChecker {
    resolver: DerivedPermissionResolver,
}

impl PermissionChecker {
    /// Create a new permission checker
    pub fn new(resolver: DerivedPermissionResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &DerivedPermissionResolver {
        &self.resolver
    }

    /// Load the caller and reject unknown or blocked accounts
    pub async fn ensure_active(&self, user_id: UserId) -> RbacResult<User> {
        let user = with_timeout(
            self.resolver.call_timeout(),
            "get_user",
            self.resolver.store().get_user(user_id),
        )
        .await?;

        match user {
            Some(user) if user.is_blocked => {
                tracing::warn!(user_id = %user_id, "Blocked user attempted an authorized action");
                Err(RbacError::UserBlocked { user_id })
            }
            Some(user) => Ok(user),
            None => Err(RbacError::permission_denied("authorize", user_id, None)),
        }
    }

    /// Check if user holds `capability` in `tenant_id`. Blocked users never do.
    pub async fn check(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        capability: Capability,
    ) -> RbacResult<bool> {
        match self.require(user_id, tenant_id, capability).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_permission_denied() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Require `capability` in `tenant_id`
    pub async fn require(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        capability: Capability,
    ) -> RbacResult<DerivedPermissionSet> {
        self.ensure_active(user_id).await?;

        let derived = self.resolver.resolve(user_id, tenant_id).await?;
        if !derived.has(capability) {
            tracing::warn!(
                user_id = %user_id,
                tenant_id = %tenant_id,
                capability = capability.as_str(),
                "Permission denied"
            );
            return Err(RbacError::permission_denied(
                capability.as_str(),
                user_id,
                Some(tenant_id),
            ));
        }

        Ok(derived)
    }

    /// Require the tenant-independent super admin flag
    pub async fn require_super_admin(&self, user_id: UserId) -> RbacResult<()> {
        self.ensure_active(user_id).await?;

        if !self.resolver.is_super_admin(user_id).await? {
            tracing::warn!(user_id = %user_id, "Super admin permission denied");
            return Err(RbacError::permission_denied("super_admin", user_id, None));
        }

        Ok(())
    }

    /// Require `requirement` in at least one tenant the target belongs to.
    ///
    /// Super admins pass for any target.
    pub async fn require_over_user(
        &self,
        caller: UserId,
        target: UserId,
        requirement: Requirement,
    ) -> RbacResult<()> {
        self.ensure_active(caller).await?;

        if self.resolver.is_super_admin(caller).await? {
            return Ok(());
        }

        let target_memberships = with_timeout(
            self.resolver.call_timeout(),
            "list_memberships",
            self.resolver.store().list_memberships(target),
        )
        .await?;

        for membership in target_memberships {
            let derived = self.resolver.resolve(caller, membership.tenant_id).await?;
            if requirement.is_met_by(&derived) {
                return Ok(());
            }
        }

        tracing::warn!(
            caller = %caller,
            target = %target,
            requirement = requirement.action(),
            "Permission over user denied"
        );
        Err(RbacError::permission_denied(requirement.action(), caller, None))
    }

    /// Check several capabilities in one tenant
    pub async fn batch_check(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        capabilities: &[Capability],
    ) -> RbacResult<Vec<bool>> {
        if let Err(err) = self.ensure_active(user_id).await {
            return if err.is_permission_denied() {
                Ok(vec![false; capabilities.len()])
            } else {
                Err(err)
            };
        }

        let derived = self.resolver.resolve(user_id, tenant_id).await?;
        Ok(capabilities
            .iter()
            .map(|capability| derived.has(*capability))
            .collect())
    }
}
