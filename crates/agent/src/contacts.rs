//! Department contact directory

use std::sync::Arc;

use serde::Serialize;

use campus_assist_config::{Department, DomainConfig, EmergencyContact, UrgentContact};

/// Compact contact attached to chat answers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickContact {
    pub department: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgent_contact: Option<UrgentContact>,
    pub action_text: String,
}

/// Read-only view over the departments of the domain config
#[derive(Debug, Clone)]
pub struct ContactDirectory {
    domain: Arc<DomainConfig>,
}

impl ContactDirectory {
    pub fn new(domain: Arc<DomainConfig>) -> Self {
        Self { domain }
    }

    pub fn all(&self) -> &[Department] {
        &self.domain.departments
    }

    pub fn by_key(&self, key: &str) -> Option<&Department> {
        self.domain.department(key)
    }

    pub fn by_category(&self, category: &str) -> Option<&Department> {
        self.domain.department_for_category(category)
    }

    /// Departments whose name, description or email contains `query`
    pub fn search(&self, query: &str) -> Vec<&Department> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.domain
            .departments
            .iter()
            .filter(|d| {
                d.name.to_lowercase().contains(&query)
                    || d.email.to_lowercase().contains(&query)
                    || d
                        .description
                        .as_deref()
                        .is_some_and(|desc| desc.to_lowercase().contains(&query))
            })
            .collect()
    }

    pub fn emergency(&self) -> &[EmergencyContact] {
        &self.domain.emergency_contacts
    }

    /// Who to contact about a category; Student Support when unmapped
    pub fn quick_contact(&self, category: &str) -> QuickContact {
        let (department, action_text) = match self.by_category(category) {
            Some(d) => (d, format!("Contact {} for help with this issue", d.name)),
            None => {
                let d = &self.domain.fallback_department;
                (d, format!("Contact {} for general assistance", d.name))
            },
        };
        QuickContact {
            department: department.name.clone(),
            email: department.email.clone(),
            phone: department
                .phone
                .clone()
                .unwrap_or_else(|| "Not available".to_string()),
            urgent_contact: department.urgent_contact.clone(),
            action_text,
        }
    }
}
