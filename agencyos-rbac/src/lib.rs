//! Tenant-scoped role-based access control for AgencyOS
//!
//! This crate computes what a user may do inside an agency (tenant):
//! - Derived permissions from role templates, per-user overrides and role escalation
//! - A blocked-first authorization gate used by every administrative operation
//! - Role template maintenance and membership role assignment
//!
//! Persistence lives behind the [`PermissionStore`] trait; an in-memory
//! implementation is provided for embedding and tests.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod permissions;
pub mod resolver;
pub mod roles;
pub mod store;

pub use auth::AuthContext;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::RbacConfig;
pub use error::{RbacError, RbacResult};
pub use memory::InMemoryPermissionStore;
pub use models::{
    Capability, CapabilityFlags, CapabilityPatch, Membership, Role, RoleTemplate, TenantId, User,
    UserId, UserPermissionOverride,
};
pub use permissions::PermissionChecker;
pub use resolver::{DerivedPermissionResolver, DerivedPermissionSet, RequestPermissionCache};
pub use roles::RoleTemplateManager;
pub use store::{with_timeout, PermissionInputs, PermissionStore, StoreTimeout};
