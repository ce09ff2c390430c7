//! Derived permission resolution
//!
//! Precedence, highest first:
//! 1. override `is_super_admin` grants every flag in every tenant
//! 2. `owner`/`admin` membership (or the legacy admin marker) grants every flag in that tenant
//! 3. otherwise each flag is `override OR template`
//! 4. without a membership every flag is false
//!
//! Step 3 is widen-only: an override set to `false` never removes a flag the
//! role template grants. Whether an override should be able to revoke a
//! template flag is an open product question; do not "fix" this without it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RbacResult;
use crate::models::{Capability, CapabilityFlags, Membership, Role, TenantId, UserId};
use crate::store::{with_timeout, PermissionInputs, PermissionStore};

/// Effective permissions of a user inside one tenant. Every flag is defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedPermissionSet {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    /// Membership role, if any
    pub role: Option<Role>,
    pub is_super_admin: bool,
    /// Owner/admin escalation in this tenant
    pub is_tenant_admin: bool,
    pub flags: CapabilityFlags,
}

impl DerivedPermissionSet {
    /// Every flag false
    pub fn empty(user_id: UserId, tenant_id: TenantId) -> Self {
        Self {
            user_id,
            tenant_id,
            role: None,
            is_super_admin: false,
            is_tenant_admin: false,
            flags: CapabilityFlags::none(),
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.flags.get(capability)
    }

    pub fn is_member(&self) -> bool {
        self.role.is_some()
    }

    /// Super admin or owner/admin of this tenant
    pub fn is_admin_level(&self) -> bool {
        self.is_super_admin || self.is_tenant_admin
    }
}

/// Computes [`DerivedPermissionSet`]s from store records.
///
/// Performs reads only; every call goes to the store.
#[derive(Clone)]
pub struct DerivedPermissionResolver {
    store: Arc<dyn PermissionStore>,
    call_timeout: Duration,
}

impl DerivedPermissionResolver {
    pub fn new(store: Arc<dyn PermissionStore>, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn PermissionStore> {
        &self.store
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Resolve the effective permissions of `user_id` in `tenant_id`
    pub async fn resolve(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> RbacResult<DerivedPermissionSet> {
        let inputs = with_timeout(
            self.call_timeout,
            "load_permission_inputs",
            self.store.load_permission_inputs(user_id, tenant_id),
        )
        .await?;

        let derived = derive(user_id, tenant_id, &inputs);
        tracing::debug!(
            user_id = %user_id,
            tenant_id = %tenant_id,
            role = ?derived.role,
            is_super_admin = derived.is_super_admin,
            granted = derived.flags.granted().len(),
            "Resolved derived permissions"
        );
        Ok(derived)
    }

    /// Tenant-independent super admin check
    pub async fn is_super_admin(&self, user_id: UserId) -> RbacResult<bool> {
        let override_flags =
            with_timeout(self.call_timeout, "get_override", self.store.get_override(user_id))
                .await?;
        Ok(override_flags.is_some_and(|o| o.is_super_admin))
    }

    /// Resolve permissions in every tenant the user belongs to
    pub async fn resolve_all_memberships(
        &self,
        user_id: UserId,
    ) -> RbacResult<Vec<DerivedPermissionSet>> {
        let memberships = with_timeout(
            self.call_timeout,
            "list_memberships",
            self.store.list_memberships(user_id),
        )
        .await?;

        let mut resolved = Vec::with_capacity(memberships.len());
        for membership in memberships {
            resolved.push(self.resolve(user_id, membership.tenant_id).await?);
        }
        Ok(resolved)
    }
}

/// Apply the precedence rules to already-loaded records
pub fn derive(user_id: UserId, tenant_id: TenantId, inputs: &PermissionInputs) -> DerivedPermissionSet {
    let mut derived = DerivedPermissionSet::empty(user_id, tenant_id);
    derived.role = inputs.membership.as_ref().map(|membership| membership.role);

    if inputs
        .override_flags
        .as_ref()
        .is_some_and(|override_flags| override_flags.is_super_admin)
    {
        derived.is_super_admin = true;
        derived.flags = CapabilityFlags::all();
        return derived;
    }

    let Some(membership) = &inputs.membership else {
        return derived;
    };

    if escalates(membership) {
        derived.is_tenant_admin = true;
        derived.flags = CapabilityFlags::all();
        return derived;
    }

    let template_flags = inputs
        .template
        .as_ref()
        .filter(|template| template.role == membership.role)
        .map(|template| template.flags)
        .unwrap_or_default();
    let override_flags = inputs
        .override_flags
        .as_ref()
        .map(|override_flags| override_flags.flags)
        .unwrap_or_default();

    // Widen-only: OR, never AND
    derived.flags = template_flags.union(&override_flags);
    derived
}

fn escalates(membership: &Membership) -> bool {
    membership.is_admin || role_escalates(membership.role)
}

/// Whether holding `role` in a tenant unlocks every flag there
pub fn role_escalates(role: Role) -> bool {
    matches!(role, Role::Owner | Role::Admin)
}

/// Memo of resolved sets for the lifetime of one request
#[derive(Clone)]
pub struct RequestPermissionCache {
    resolver: DerivedPermissionResolver,
    resolved: Arc<Mutex<HashMap<(UserId, TenantId), DerivedPermissionSet>>>,
}

impl RequestPermissionCache {
    pub fn new(resolver: DerivedPermissionResolver) -> Self {
        Self {
            resolver,
            resolved: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn resolve(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> RbacResult<DerivedPermissionSet> {
        let cached = self.resolved.lock().get(&(user_id, tenant_id)).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let derived = self.resolver.resolve(user_id, tenant_id).await?;
        self.resolved
            .lock()
            .insert((user_id, tenant_id), derived.clone());
        Ok(derived)
    }

    pub fn len(&self) -> usize {
        self.resolved.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPermissionStore;
    use crate::models::{RoleTemplate, UserPermissionOverride};

    fn make_inputs(
        role: Option<Role>,
        template: &[Capability],
        override_flags: Option<UserPermissionOverride>,
    ) -> (UserId, TenantId, PermissionInputs) {
        let user = UserId::new();
        let tenant = TenantId::new();
        let inputs = PermissionInputs {
            membership: role.map(|role| Membership::new(user, tenant, role)),
            template: role.map(|role| {
                RoleTemplate::new(role, "test", CapabilityFlags::from_granted(template))
            }),
            override_flags,
        };
        (user, tenant, inputs)
    }

    #[test]
    fn test_no_membership_is_all_false() {
        let (user, tenant, inputs) = make_inputs(None, &[], None);
        let derived = derive(user, tenant, &inputs);
        assert!(derived.flags.granted().is_empty());
        assert!(!derived.is_super_admin);
        assert!(!derived.is_member());
    }

    #[test]
    fn test_override_widens_template() {
        let user = UserId::new();
        let override_flags =
            UserPermissionOverride::new(user).granting(Capability::CanExportData);
        let (_, tenant, inputs) = make_inputs(
            Some(Role::Viewer),
            &[Capability::CanViewReports],
            Some(override_flags),
        );

        let derived = derive(user, tenant, &inputs);
        assert!(derived.has(Capability::CanExportData));
        assert!(derived.has(Capability::CanViewReports));
    }

    #[test]
    fn test_override_false_never_narrows_template() {
        let user = UserId::new();
        // Explicit false on a flag the template grants
        let mut override_flags = UserPermissionOverride::new(user);
        override_flags.flags.set(Capability::CanViewClients, false);
        let (_, tenant, inputs) = make_inputs(
            Some(Role::Support),
            &[Capability::CanViewClients],
            Some(override_flags),
        );

        assert!(derive(user, tenant, &inputs).has(Capability::CanViewClients));
    }

    #[test]
    fn test_widen_only_law_holds_for_every_flag() {
        let user = UserId::new();
        for capability in Capability::ALL {
            for template_value in [false, true] {
                for override_value in [false, true] {
                    let mut override_flags = UserPermissionOverride::new(user);
                    override_flags.flags.set(capability, override_value);
                    let granted: Vec<Capability> =
                        if template_value { vec![capability] } else { vec![] };
                    let (_, tenant, inputs) =
                        make_inputs(Some(Role::Operator), &granted, Some(override_flags));

                    assert_eq!(
                        derive(user, tenant, &inputs).has(capability),
                        template_value || override_value,
                        "{} template={} override={}",
                        capability,
                        template_value,
                        override_value
                    );
                }
            }
        }
    }

    #[test]
    fn test_legacy_admin_flag_escalates() {
        let (user, tenant, mut inputs) = make_inputs(Some(Role::Viewer), &[], None);
        if let Some(membership) = inputs.membership.as_mut() {
            membership.is_admin = true;
        }
        let derived = derive(user, tenant, &inputs);
        assert!(derived.is_tenant_admin);
        assert_eq!(derived.flags, CapabilityFlags::all());
    }

    #[tokio::test]
    async fn test_super_admin_everywhere() {
        let store = Arc::new(InMemoryPermissionStore::new());
        let user = UserId::new();
        store
            .put_override(UserPermissionOverride::super_admin(user))
            .await
            .unwrap();

        let resolver = DerivedPermissionResolver::new(store, Duration::from_secs(1));
        for _ in 0..3 {
            let derived = resolver.resolve(user, TenantId::new()).await.unwrap();
            assert!(derived.is_super_admin);
            assert_eq!(derived.flags, CapabilityFlags::all());
        }
        assert!(resolver.is_super_admin(user).await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_escalation_is_tenant_local() {
        let store = Arc::new(InMemoryPermissionStore::new());
        let user = UserId::new();
        let home = TenantId::new();
        let other = TenantId::new();
        store
            .replace_membership(Membership::new(user, home, Role::Admin))
            .await
            .unwrap();

        let resolver = DerivedPermissionResolver::new(store, Duration::from_secs(1));
        assert_eq!(
            resolver.resolve(user, home).await.unwrap().flags,
            CapabilityFlags::all()
        );
        assert_eq!(
            resolver.resolve(user, other).await.unwrap().flags,
            CapabilityFlags::none()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let store = Arc::new(InMemoryPermissionStore::new());
        store.set_latency(Some(Duration::from_secs(10)));

        let resolver = DerivedPermissionResolver::new(store, Duration::from_millis(100));
        let err = resolver.resolve(UserId::new(), TenantId::new()).await.unwrap_err();
        assert!(matches!(err, crate::error::RbacError::StoreTimeout(_)));
    }

    #[tokio::test]
    async fn test_request_cache_reuses_result() {
        let store = Arc::new(InMemoryPermissionStore::new());
        let user = UserId::new();
        let tenant = TenantId::new();
        store
            .replace_membership(Membership::new(user, tenant, Role::Owner))
            .await
            .unwrap();

        let resolver = DerivedPermissionResolver::new(store.clone(), Duration::from_secs(1));
        let cache = RequestPermissionCache::new(resolver.clone());
        assert!(cache.resolve(user, tenant).await.unwrap().is_tenant_admin);

        // Demotion is invisible to the memo but visible to a fresh resolve
        store
            .replace_membership(Membership::new(user, tenant, Role::Viewer))
            .await
            .unwrap();
        assert!(cache.resolve(user, tenant).await.unwrap().is_tenant_admin);
        assert!(!resolver.resolve(user, tenant).await.unwrap().is_tenant_admin);
        assert_eq!(cache.len(), 1);
    }
}
