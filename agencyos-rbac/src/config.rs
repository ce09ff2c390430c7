//! Configuration for the permission system

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RbacError, RbacResult};
use crate::models::{Capability, CapabilityFlags, Role, RoleTemplate};

/// RBAC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacConfig {
    /// Deadline for a single permission store call
    pub store_call_timeout: Duration,

    /// Install `standard_templates` when the store has no template for a role
    pub seed_default_templates: bool,

    /// Standard role templates
    pub standard_templates: Vec<TemplateDefinition>,
}

/// Default capability set for one role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub role: Role,
    pub description: String,
    pub granted: Vec<Capability>,
}

impl TemplateDefinition {
    fn new(role: Role, description: &str, granted: &[Capability]) -> Self {
        Self {
            role,
            description: description.to_string(),
            granted: granted.to_vec(),
        }
    }

    pub fn to_template(&self) -> RoleTemplate {
        RoleTemplate::new(
            self.role,
            self.description.clone(),
            CapabilityFlags::from_granted(&self.granted),
        )
    }
}

impl Default for RbacConfig {
    fn default() -> Self {
        use Capability::*;

        let standard_templates = vec![
            TemplateDefinition::new(Role::Owner, "Agency owner with full access", &Capability::ALL),
            TemplateDefinition::new(
                Role::Admin,
                "Agency administrator with full access",
                &Capability::ALL,
            ),
            TemplateDefinition::new(
                Role::Manager,
                "Runs the team and the client book",
                &[
                    CanViewReports,
                    CanExportData,
                    CanViewClients,
                    CanEditClients,
                    CanManagePipeline,
                    CanManageProposals,
                    CanManageContracts,
                    CanViewCommissions,
                    CanManageTeam,
                ],
            ),
            TemplateDefinition::new(
                Role::SalesRep,
                "Works deals through the pipeline",
                &[
                    CanViewReports,
                    CanViewClients,
                    CanEditClients,
                    CanManagePipeline,
                    CanManageProposals,
                    CanViewCommissions,
                ],
            ),
            TemplateDefinition::new(
                Role::Support,
                "Handles client requests",
                &[CanViewReports, CanViewClients, CanEditClients],
            ),
            TemplateDefinition::new(
                Role::Operator,
                "Delivers client work",
                &[
                    CanViewClients,
                    CanManagePipeline,
                    CanManageProposals,
                    CanManageContracts,
                ],
            ),
            TemplateDefinition::new(
                Role::Viewer,
                "Read-only access",
                &[CanViewReports, CanViewClients],
            ),
            TemplateDefinition::new(
                Role::SuperAdmin,
                "Platform operator",
                &Capability::ALL,
            ),
        ];

        Self {
            store_call_timeout: Duration::from_secs(5),
            seed_default_templates: true,
            standard_templates,
        }
    }
}

impl RbacConfig {
    /// Get the standard template definition for a role
    pub fn get_template_definition(&self, role: Role) -> Option<&TemplateDefinition> {
        self.standard_templates
            .iter()
            .find(|definition| definition.role == role)
    }

    pub fn with_store_call_timeout(mut self, timeout: Duration) -> Self {
        self.store_call_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> RbacResult<()> {
        if self.store_call_timeout.is_zero() {
            return Err(RbacError::InvalidConfig {
                message: "store_call_timeout must be greater than zero".to_string(),
            });
        }

        for role in Role::ALL {
            let count = self
                .standard_templates
                .iter()
                .filter(|definition| definition.role == role)
                .count();
            if count > 1 {
                return Err(RbacError::InvalidConfig {
                    message: format!("Role '{}' has {} standard templates", role, count),
                });
            }
        }

        Ok(())
    }
}
