//! Role template maintenance and role assignment

use std::sync::Arc;

use crate::{
    clock::SharedClock,
    config::RbacConfig,
    error::{RbacError, RbacResult},
    models::{Capability, CapabilityFlags, CapabilityPatch, Membership, Role, RoleTemplate, TenantId, UserId},
    permissions::PermissionChecker,
    resolver::role_escalates,
    store::{with_timeout, PermissionStore},
};

/// Manages the per-role default capability sets and membership roles
#[derive(Clone)]
pub struct RoleTemplateManager {
    checker: PermissionChecker,
    config: Arc<RbacConfig>,
    clock: SharedClock,
}

impl RoleTemplateManager {
    /// Create a new role template manager
    pub fn new(checker: PermissionChecker, config: Arc<RbacConfig>, clock: SharedClock) -> Self {
        Self {
            checker,
            config,
            clock,
        }
    }

    fn store(&self) -> &Arc<dyn PermissionStore> {
        self.checker.resolver().store()
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> RbacResult<T>
    where
        F: std::future::Future<Output = RbacResult<T>>,
    {
        with_timeout(self.config.store_call_timeout, operation, call).await
    }

    /// Install the standard templates for roles that have no global template yet
    pub async fn seed_defaults(&self) -> RbacResult<usize> {
        let mut installed = 0;

        for definition in &self.config.standard_templates {
            let existing = self
                .bounded("get_template", self.store().get_template(definition.role, None))
                .await?;
            if existing.is_some() {
                continue;
            }

            let mut template = definition.to_template();
            template.updated_at = self.clock.now();
            self.bounded("put_template", self.store().put_template(template))
                .await?;
            installed += 1;
        }

        if installed > 0 {
            tracing::info!(installed, "Seeded default role templates");
        }
        Ok(installed)
    }

    /// List every template; unrestricted
    pub async fn list_templates(&self) -> RbacResult<Vec<RoleTemplate>> {
        self.bounded("list_templates", self.store().list_templates())
            .await
    }

    /// Get the global template for a role
    pub async fn get_template(&self, role: Role) -> RbacResult<RoleTemplate> {
        self.bounded("get_template", self.store().get_template(role, None))
            .await?
            .ok_or(RbacError::TemplateNotFound { role })
    }

    /// Merge `patch` into the global template of `role`. Super admin only.
    ///
    /// Flags missing from the patch keep their value. The change applies to
    /// every member holding the role, in every tenant, on their next resolve.
    pub async fn update_template(
        &self,
        caller: UserId,
        role: Role,
        patch: &CapabilityPatch,
    ) -> RbacResult<RoleTemplate> {
        self.checker.require_super_admin(caller).await?;

        let mut template = match self
            .bounded("get_template", self.store().get_template(role, None))
            .await?
        {
            Some(existing) => existing,
            None => self
                .config
                .get_template_definition(role)
                .map(|definition| definition.to_template())
                .unwrap_or_else(|| {
                    RoleTemplate::new(role, role.as_str(), CapabilityFlags::none())
                }),
        };

        template.flags.apply(patch);
        template.updated_at = self.clock.now();
        template.updated_by = Some(caller);

        let saved = self
            .bounded("put_template", self.store().put_template(template))
            .await?;

        let changed: Vec<&str> = patch.0.keys().map(Capability::as_str).collect();
        tracing::info!(
            caller = %caller,
            role = role.as_str(),
            changed = ?changed,
            "Role template updated"
        );
        Ok(saved)
    }

    /// Replace the target's role in `tenant_id`. Requires `can_manage_team` there.
    pub async fn assign_role(
        &self,
        caller: UserId,
        target: UserId,
        new_role: Role,
        tenant_id: TenantId,
    ) -> RbacResult<Membership> {
        let granter = self
            .checker
            .require(caller, tenant_id, Capability::CanManageTeam)
            .await?;

        if new_role == Role::SuperAdmin {
            return Err(RbacError::invalid_assignment(
                "super_admin cannot be granted through role assignment",
            ));
        }
        if caller == target && !granter.is_super_admin {
            return Err(RbacError::invalid_assignment(
                "members cannot change their own role",
            ));
        }
        // Granting owner/admin hands out every flag; only admin-level callers may
        if role_escalates(new_role) && !granter.is_admin_level() {
            return Err(RbacError::invalid_assignment(
                "only an owner or admin can grant owner or admin",
            ));
        }

        if self
            .bounded("get_user", self.store().get_user(target))
            .await?
            .is_none()
        {
            return Err(RbacError::UserNotFound { user_id: target });
        }

        let mut membership = Membership::new(target, tenant_id, new_role);
        membership.updated_at = self.clock.now();

        let previous = self
            .bounded("get_membership", self.store().get_membership(target, tenant_id))
            .await?
            .map(|membership| membership.role);
        let saved = self
            .bounded("replace_membership", self.store().replace_membership(membership))
            .await?;

        tracing::info!(
            caller = %caller,
            target = %target,
            tenant_id = %tenant_id,
            previous_role = ?previous,
            new_role = new_role.as_str(),
            "Member role assigned"
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::memory::InMemoryPermissionStore;
    use crate::models::{User, UserPermissionOverride};
    use crate::resolver::DerivedPermissionResolver;
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryPermissionStore>,
        manager: RoleTemplateManager,
        resolver: DerivedPermissionResolver,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryPermissionStore::new());
        let resolver = DerivedPermissionResolver::new(store.clone(), Duration::from_secs(1));
        let manager = RoleTemplateManager::new(
            PermissionChecker::new(resolver.clone()),
            Arc::new(RbacConfig::default()),
            SystemClock::shared(),
        );
        manager.seed_defaults().await.unwrap();
        Fixture {
            store,
            manager,
            resolver,
        }
    }

    async fn user(store: &InMemoryPermissionStore, email: &str) -> UserId {
        store.put_user(User::new(email)).await.unwrap().id
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let fixture = fixture().await;
        assert_eq!(fixture.manager.seed_defaults().await.unwrap(), 0);
        assert_eq!(
            fixture.manager.list_templates().await.unwrap().len(),
            Role::ALL.len()
        );
    }

    #[tokio::test]
    async fn test_update_template_requires_super_admin() {
        let fixture = fixture().await;
        let tenant = TenantId::new();
        let owner = user(&fixture.store, "owner@agency.test").await;
        fixture
            .store
            .replace_membership(Membership::new(owner, tenant, Role::Owner))
            .await
            .unwrap();

        let patch = CapabilityPatch::new().with(Capability::CanExportData, true);
        let err = fixture
            .manager
            .update_template(owner, Role::Viewer, &patch)
            .await
            .unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[tokio::test]
    async fn test_update_template_merges_and_applies_immediately() {
        let fixture = fixture().await;
        let root = user(&fixture.store, "root@agency.test").await;
        fixture
            .store
            .put_override(UserPermissionOverride::super_admin(root))
            .await
            .unwrap();

        let tenant = TenantId::new();
        let viewer = user(&fixture.store, "viewer@agency.test").await;
        fixture
            .store
            .replace_membership(Membership::new(viewer, tenant, Role::Viewer))
            .await
            .unwrap();
        assert!(!fixture
            .resolver
            .resolve(viewer, tenant)
            .await
            .unwrap()
            .has(Capability::CanExportData));

        let patch = CapabilityPatch::new().with(Capability::CanExportData, true);
        let updated = fixture
            .manager
            .update_template(root, Role::Viewer, &patch)
            .await
            .unwrap();
        assert_eq!(updated.updated_by, Some(root));
        // Untouched flags keep their value
        assert!(updated.flags.get(Capability::CanViewReports));

        assert!(fixture
            .resolver
            .resolve(viewer, tenant)
            .await
            .unwrap()
            .has(Capability::CanExportData));
    }

    #[tokio::test]
    async fn test_assign_role_rules() {
        let fixture = fixture().await;
        let tenant = TenantId::new();
        let manager = user(&fixture.store, "manager@agency.test").await;
        let rep = user(&fixture.store, "rep@agency.test").await;
        for (id, role) in [(manager, Role::Manager), (rep, Role::SalesRep)] {
            fixture
                .store
                .replace_membership(Membership::new(id, tenant, role))
                .await
                .unwrap();
        }

        let assigned = fixture
            .manager
            .assign_role(manager, rep, Role::Support, tenant)
            .await
            .unwrap();
        assert_eq!(assigned.role, Role::Support);
        assert_eq!(fixture.store.list_memberships(rep).await.unwrap().len(), 1);

        let err = fixture
            .manager
            .assign_role(manager, rep, Role::SuperAdmin, tenant)
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::InvalidRoleAssignment { .. }));

        // Support has no can_manage_team
        assert!(fixture
            .manager
            .assign_role(rep, manager, Role::Viewer, tenant)
            .await
            .unwrap_err()
            .is_permission_denied());

        assert!(fixture
            .manager
            .assign_role(manager, UserId::new(), Role::Viewer, tenant)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_assign_role_blocks_escalation() {
        let fixture = fixture().await;
        let tenant = TenantId::new();
        let owner = user(&fixture.store, "owner@agency.test").await;
        let manager = user(&fixture.store, "manager@agency.test").await;
        let rep = user(&fixture.store, "rep@agency.test").await;
        for (id, role) in [
            (owner, Role::Owner),
            (manager, Role::Manager),
            (rep, Role::SalesRep),
        ] {
            fixture
                .store
                .replace_membership(Membership::new(id, tenant, role))
                .await
                .unwrap();
        }

        for role in [Role::Owner, Role::Admin, Role::Viewer] {
            let err = fixture
                .manager
                .assign_role(manager, manager, role, tenant)
                .await
                .unwrap_err();
            assert!(matches!(err, RbacError::InvalidRoleAssignment { .. }));
        }

        let err = fixture
            .manager
            .assign_role(manager, rep, Role::Admin, tenant)
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::InvalidRoleAssignment { .. }));
        assert_eq!(
            fixture.store.get_membership(manager, tenant).await.unwrap().unwrap().role,
            Role::Manager
        );

        let promoted = fixture
            .manager
            .assign_role(owner, manager, Role::Admin, tenant)
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_get_missing_template() {
        let store = Arc::new(InMemoryPermissionStore::new());
        let resolver = DerivedPermissionResolver::new(store, Duration::from_secs(1));
        let manager = RoleTemplateManager::new(
            PermissionChecker::new(resolver),
            Arc::new(RbacConfig::default()),
            SystemClock::shared(),
        );
        assert!(matches!(
            manager.get_template(Role::Viewer).await,
            Err(RbacError::TemplateNotFound { role: Role::Viewer })
        ));
    }
}
