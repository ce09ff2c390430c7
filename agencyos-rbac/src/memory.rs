//! In-memory permission store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{RbacError, RbacResult};
use crate::models::{
    Membership, Role, RoleTemplate, TenantId, User, UserId, UserPermissionOverride,
};
use crate::store::{PermissionInputs, PermissionStore};

#[derive(Debug, Default)]
struct Records {
    users: HashMap<UserId, User>,
    memberships: HashMap<(UserId, TenantId), Membership>,
    overrides: HashMap<UserId, UserPermissionOverride>,
    templates: HashMap<(Role, Option<TenantId>), RoleTemplate>,
}

impl Records {
    fn template_for(&self, role: Role, tenant_id: Option<TenantId>) -> Option<RoleTemplate> {
        tenant_id
            .and_then(|tenant| self.templates.get(&(role, Some(tenant))))
            .or_else(|| self.templates.get(&(role, None)))
            .cloned()
    }
}

/// Permission store held in process memory.
///
/// Writes take one write lock, so a membership replacement is a single
/// atomic step. Latency and outages can be injected for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPermissionStore {
    records: Arc<RwLock<Records>>,
    latency: Arc<parking_lot::Mutex<Option<Duration>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Make every call fail with a store error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn enter(&self) -> RbacResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RbacError::store("permission store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn get_user(&self, user_id: UserId) -> RbacResult<Option<User>> {
        self.enter().await?;
        Ok(self.records.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RbacResult<Option<User>> {
        self.enter().await?;
        let records = self.records.read().await;
        Ok(records
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn put_user(&self, user: User) -> RbacResult<User> {
        self.enter().await?;
        self.records.write().await.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_membership(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> RbacResult<Option<Membership>> {
        self.enter().await?;
        Ok(self
            .records
            .read()
            .await
            .memberships
            .get(&(user_id, tenant_id))
            .cloned())
    }

    async fn list_memberships(&self, user_id: UserId) -> RbacResult<Vec<Membership>> {
        self.enter().await?;
        let records = self.records.read().await;
        let mut memberships: Vec<Membership> = records
            .memberships
            .values()
            .filter(|membership| membership.user_id == user_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|membership| membership.tenant_id);
        Ok(memberships)
    }

    async fn replace_membership(&self, membership: Membership) -> RbacResult<Membership> {
        self.enter().await?;
        self.records
            .write()
            .await
            .memberships
            .insert((membership.user_id, membership.tenant_id), membership.clone());
        Ok(membership)
    }

    async fn get_override(&self, user_id: UserId) -> RbacResult<Option<UserPermissionOverride>> {
        self.enter().await?;
        Ok(self.records.read().await.overrides.get(&user_id).cloned())
    }

    async fn put_override(
        &self,
        override_flags: UserPermissionOverride,
    ) -> RbacResult<UserPermissionOverride> {
        self.enter().await?;
        self.records
            .write()
            .await
            .overrides
            .insert(override_flags.user_id, override_flags.clone());
        Ok(override_flags)
    }

    async fn get_template(
        &self,
        role: Role,
        tenant_id: Option<TenantId>,
    ) -> RbacResult<Option<RoleTemplate>> {
        self.enter().await?;
        Ok(self.records.read().await.template_for(role, tenant_id))
    }

    async fn list_templates(&self) -> RbacResult<Vec<RoleTemplate>> {
        self.enter().await?;
        let records = self.records.read().await;
        let mut templates: Vec<RoleTemplate> = records.templates.values().cloned().collect();
        templates.sort_by_key(|template| (template.role, template.tenant_id));
        Ok(templates)
    }

    async fn put_template(&self, template: RoleTemplate) -> RbacResult<RoleTemplate> {
        self.enter().await?;
        self.records
            .write()
            .await
            .templates
            .insert((template.role, template.tenant_id), template.clone());
        Ok(template)
    }

    // One read lock so the three records come from the same snapshot
    async fn load_permission_inputs(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> RbacResult<PermissionInputs> {
        self.enter().await?;
        let records = self.records.read().await;

        let membership = records.memberships.get(&(user_id, tenant_id)).cloned();
        let template = membership
            .as_ref()
            .and_then(|membership| records.template_for(membership.role, Some(tenant_id)));

        Ok(PermissionInputs {
            membership,
            override_flags: records.overrides.get(&user_id).cloned(),
            template,
        })
    }
}
