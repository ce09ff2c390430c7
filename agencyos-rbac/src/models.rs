//! Data models for the permission system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User identifier issued by the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Agency identifier; the isolation boundary for members and permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Account record as far as access control is concerned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub email_confirmed: bool,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
    pub blocked_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new unblocked user
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            email_confirmed: true,
            is_blocked: false,
            blocked_reason: None,
            blocked_at: None,
        }
    }

    pub fn with_id(mut self, id: UserId) -> Self {
        self.id = id;
        self
    }
}

/// Closed set of membership roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Manager,
    SalesRep,
    Support,
    Operator,
    Viewer,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Owner,
        Role::Admin,
        Role::Manager,
        Role::SalesRep,
        Role::Support,
        Role::Operator,
        Role::Viewer,
        Role::SuperAdmin,
    ];

    /// Convert to the stored label
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::SalesRep => "sales_rep",
            Role::Support => "support",
            Role::Operator => "operator",
            Role::Viewer => "viewer",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}

/// Capability flags, in their fixed display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CanViewReports,
    CanExportData,
    CanViewClients,
    CanEditClients,
    CanDeleteClients,
    CanManagePipeline,
    CanManageProposals,
    CanManageContracts,
    CanViewCommissions,
    CanManageCommissions,
    CanManageTeam,
    CanManageSettings,
    CanViewSecurity,
    CanManageBilling,
}

impl Capability {
    pub const ALL: [Capability; 14] = [
        Capability::CanViewReports,
        Capability::CanExportData,
        Capability::CanViewClients,
        Capability::CanEditClients,
        Capability::CanDeleteClients,
        Capability::CanManagePipeline,
        Capability::CanManageProposals,
        Capability::CanManageContracts,
        Capability::CanViewCommissions,
        Capability::CanManageCommissions,
        Capability::CanManageTeam,
        Capability::CanManageSettings,
        Capability::CanViewSecurity,
        Capability::CanManageBilling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CanViewReports => "can_view_reports",
            Capability::CanExportData => "can_export_data",
            Capability::CanViewClients => "can_view_clients",
            Capability::CanEditClients => "can_edit_clients",
            Capability::CanDeleteClients => "can_delete_clients",
            Capability::CanManagePipeline => "can_manage_pipeline",
            Capability::CanManageProposals => "can_manage_proposals",
            Capability::CanManageContracts => "can_manage_contracts",
            Capability::CanViewCommissions => "can_view_commissions",
            Capability::CanManageCommissions => "can_manage_commissions",
            Capability::CanManageTeam => "can_manage_team",
            Capability::CanManageSettings => "can_manage_settings",
            Capability::CanViewSecurity => "can_view_security",
            Capability::CanManageBilling => "can_manage_billing",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete set of capability flags; every flag is always defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilityFlags([bool; 14]);

impl CapabilityFlags {
    /// Every flag false
    pub fn none() -> Self {
        Self::default()
    }

    /// Every flag true
    pub fn all() -> Self {
        Self([true; 14])
    }

    /// Flags with exactly the given capabilities set
    pub fn from_granted(granted: &[Capability]) -> Self {
        let mut flags = Self::none();
        for capability in granted {
            flags.set(*capability, true);
        }
        flags
    }

    pub fn get(&self, capability: Capability) -> bool {
        self.0[capability.index()]
    }

    pub fn set(&mut self, capability: Capability, value: bool) {
        self.0[capability.index()] = value;
    }

    /// Per-flag OR
    pub fn union(&self, other: &CapabilityFlags) -> CapabilityFlags {
        let mut merged = *self;
        for (slot, value) in merged.0.iter_mut().zip(other.0) {
            *slot |= value;
        }
        merged
    }

    /// Capabilities currently granted, in display order
    pub fn granted(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|capability| self.get(*capability))
            .collect()
    }

    /// Apply a partial update; flags absent from the patch keep their value
    pub fn apply(&mut self, patch: &CapabilityPatch) {
        for (capability, value) in &patch.0 {
            self.set(*capability, *value);
        }
    }
}

// Serialized as a full `{ "can_view_reports": bool, ... }` object
impl Serialize for CapabilityFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<Capability, bool> = Capability::ALL
            .into_iter()
            .map(|capability| (capability, self.get(capability)))
            .collect();
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CapabilityFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<Capability, bool>::deserialize(deserializer)?;
        let mut flags = CapabilityFlags::none();
        for (capability, value) in map {
            flags.set(capability, value);
        }
        Ok(flags)
    }
}

/// Partial flag update; only the listed capabilities change
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityPatch(pub BTreeMap<Capability, bool>);

impl CapabilityPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability, value: bool) -> Self {
        self.0.insert(capability, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Default capability bag for a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTemplate {
    pub role: Role,
    pub description: String,
    pub flags: CapabilityFlags,
    /// Global template when `None`
    pub tenant_id: Option<TenantId>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<UserId>,
}

impl RoleTemplate {
    pub fn new(role: Role, description: impl Into<String>, flags: CapabilityFlags) -> Self {
        Self {
            role,
            description: description.into(),
            flags,
            tenant_id: None,
            updated_at: Utc::now(),
            updated_by: None,
        }
    }

    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }
}

/// A user's single role inside one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: Role,
    /// Legacy admin marker on older rows; escalates like the admin role
    #[serde(default)]
    pub is_admin: bool,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: UserId, tenant_id: TenantId, role: Role) -> Self {
        Self {
            user_id,
            tenant_id,
            role,
            is_admin: false,
            updated_at: Utc::now(),
        }
    }
}

/// Per-user flags layered above the role template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPermissionOverride {
    pub user_id: UserId,
    #[serde(default)]
    pub is_super_admin: bool,
    #[serde(default)]
    pub flags: CapabilityFlags,
}

impl UserPermissionOverride {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            is_super_admin: false,
            flags: CapabilityFlags::none(),
        }
    }

    pub fn super_admin(user_id: UserId) -> Self {
        Self {
            is_super_admin: true,
            ..Self::new(user_id)
        }
    }

    pub fn granting(mut self, capability: Capability) -> Self {
        self.flags.set(capability, true);
        self
    }
}
