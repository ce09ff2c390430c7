//! Resolution scenarios against the in-memory store

use std::sync::Arc;
use std::time::Duration;

use agencyos_rbac::{
    Capability, CapabilityFlags, CapabilityPatch, DerivedPermissionResolver,
    InMemoryPermissionStore, Membership, PermissionChecker, PermissionStore, RbacConfig, Role,
    RoleTemplateManager, SystemClock, TenantId, User, UserId, UserPermissionOverride,
};

struct World {
    store: Arc<InMemoryPermissionStore>,
    resolver: DerivedPermissionResolver,
    templates: RoleTemplateManager,
}

async fn world() -> World {
    let store = Arc::new(InMemoryPermissionStore::new());
    let resolver = DerivedPermissionResolver::new(store.clone(), Duration::from_secs(1));
    let templates = RoleTemplateManager::new(
        PermissionChecker::new(resolver.clone()),
        Arc::new(RbacConfig::default()),
        SystemClock::shared(),
    );
    templates.seed_defaults().await.unwrap();
    World {
        store,
        resolver,
        templates,
    }
}

#[test]
fn test_fresh_user_has_nothing() {
    tokio_test::block_on(async {
        let world = world().await;
        let user = world.store.put_user(User::new("new@agency.test")).await.unwrap();

        let derived = world.resolver.resolve(user.id, TenantId::new()).await.unwrap();
        assert_eq!(derived.flags, CapabilityFlags::none());
        assert!(!derived.is_super_admin);
        assert!(derived.role.is_none());
    });
}

#[tokio::test]
async fn test_override_widens_viewer_export() {
    let world = world().await;
    let tenant = TenantId::new();
    let user = world.store.put_user(User::new("viewer@agency.test")).await.unwrap();
    world
        .store
        .replace_membership(Membership::new(user.id, tenant, Role::Viewer))
        .await
        .unwrap();

    let template = world.templates.get_template(Role::Viewer).await.unwrap();
    assert!(!template.flags.get(Capability::CanExportData));

    world
        .store
        .put_override(UserPermissionOverride::new(user.id).granting(Capability::CanExportData))
        .await
        .unwrap();

    let derived = world.resolver.resolve(user.id, tenant).await.unwrap();
    assert!(derived.has(Capability::CanExportData));
    assert!(derived.has(Capability::CanViewReports));
    assert!(!derived.has(Capability::CanDeleteClients));
}

#[tokio::test]
async fn test_super_admin_crosses_tenants_owner_does_not() {
    let world = world().await;
    let root = UserId::new();
    world
        .store
        .put_override(UserPermissionOverride::super_admin(root))
        .await
        .unwrap();

    let owner = world.store.put_user(User::new("owner@agency.test")).await.unwrap();
    let home = TenantId::new();
    world
        .store
        .replace_membership(Membership::new(owner.id, home, Role::Owner))
        .await
        .unwrap();

    for tenant in [home, TenantId::new(), TenantId::new()] {
        assert_eq!(
            world.resolver.resolve(root, tenant).await.unwrap().flags,
            CapabilityFlags::all()
        );
    }

    let foreign = world.resolver.resolve(owner.id, TenantId::new()).await.unwrap();
    assert_eq!(foreign.flags, CapabilityFlags::none());
    assert!(!foreign.is_super_admin);
}

#[tokio::test]
async fn test_revoking_in_template_is_not_undone_by_false_override() {
    let world = world().await;
    let root = world.store.put_user(User::new("root@agency.test")).await.unwrap();
    world
        .store
        .put_override(UserPermissionOverride::super_admin(root.id))
        .await
        .unwrap();

    let tenant = TenantId::new();
    let rep = world.store.put_user(User::new("rep@agency.test")).await.unwrap();
    world
        .store
        .replace_membership(Membership::new(rep.id, tenant, Role::SalesRep))
        .await
        .unwrap();
    // An all-false override row exists; it must not narrow anything
    world
        .store
        .put_override(UserPermissionOverride::new(rep.id))
        .await
        .unwrap();
    assert!(world
        .resolver
        .resolve(rep.id, tenant)
        .await
        .unwrap()
        .has(Capability::CanManagePipeline));

    world
        .templates
        .update_template(
            root.id,
            Role::SalesRep,
            &CapabilityPatch::new().with(Capability::CanManagePipeline, false),
        )
        .await
        .unwrap();
    assert!(!world
        .resolver
        .resolve(rep.id, tenant)
        .await
        .unwrap()
        .has(Capability::CanManagePipeline));
}
