//! Error types for RBAC operations

use agencyos_errors::{Classify, ErrorKind};
use thiserror::Error;

use crate::models::{Role, TenantId, UserId};
use crate::store::StoreTimeout;

/// Result type for RBAC operations
pub type RbacResult<T> = Result<T, RbacError>;

/// RBAC-specific errors
#[derive(Error, Debug)]
pub enum RbacError {
    /// Caller lacks the capability for the action
    #[error("Permission denied: {action} for user {user_id} in tenant {tenant_id:?}")]
    PermissionDenied {
        action: String,
        user_id: UserId,
        tenant_id: Option<TenantId>,
    },

    /// Caller account is blocked
    #[error("User {user_id} is blocked")]
    UserBlocked { user_id: UserId },

    /// User not found
    #[error("User not found: {user_id}")]
    UserNotFound { user_id: UserId },

    /// Role template not found
    #[error("Role template not found: {role}")]
    TemplateNotFound { role: Role },

    /// Role assignment rejected
    #[error("Invalid role assignment: {message}")]
    InvalidRoleAssignment { message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Store call did not finish in time
    #[error(transparent)]
    StoreTimeout(#[from] StoreTimeout),

    /// Store reported a failure
    #[error("Store error: {message}")]
    Store { message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RbacError {
    /// Create a new permission denied error
    pub fn permission_denied(
        action: impl Into<String>,
        user_id: UserId,
        tenant_id: Option<TenantId>,
    ) -> Self {
        Self::PermissionDenied {
            action: action.into(),
            user_id,
            tenant_id,
        }
    }

    /// Create a new invalid role assignment error
    pub fn invalid_assignment(message: impl Into<String>) -> Self {
        Self::InvalidRoleAssignment {
            message: message.into(),
        }
    }

    /// Create a new store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Check if this is a permission denied error
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. } | Self::UserBlocked { .. })
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound { .. } | Self::TemplateNotFound { .. }
        )
    }
}

impl Classify for RbacError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied { .. } | Self::UserBlocked { .. } => ErrorKind::Permission,
            Self::UserNotFound { .. } | Self::TemplateNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidRoleAssignment { .. } => ErrorKind::Validation,
            Self::StoreTimeout(_) => ErrorKind::Network,
            Self::InvalidConfig { .. } | Self::Store { .. } | Self::Serialization(_) => {
                ErrorKind::Server
            }
        }
    }

    fn public_message(&self) -> Option<String> {
        match self {
            Self::UserNotFound { .. } => Some("User not found".to_string()),
            Self::TemplateNotFound { role } => Some(format!("Role template '{}' not found", role)),
            Self::InvalidRoleAssignment { message } => Some(message.clone()),
            _ => None,
        }
    }
}
