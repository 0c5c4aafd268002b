//! Candidate policy validation for the reload path

use super::stored::{PolicyKind, PolicyPayload, StoredPolicy};
use super::{Condition, DERIVED_ROLES_KIND, RESOURCE_POLICY_KIND};
use crate::cel;
use crate::error::AuthzError;
use std::collections::HashSet;
use std::fmt;

/// A single problem found in one stored policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub policy_id: String,
    pub policy_name: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy '{}' ({}): {}", self.policy_name, self.policy_id, self.message)
    }
}

/// All issues found in a candidate set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.issues.extend(other.issues);
    }

    /// `Ok` when valid, otherwise an [`AuthzError::Validation`] naming
    /// every offending policy
    pub fn into_result(self) -> crate::error::Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AuthzError::Validation(self.to_string()))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", issue)?;
        }
        Ok(())
    }
}

/// Validate every record fetched for one expected kind
pub fn validate_candidate(expected: PolicyKind, policies: &[StoredPolicy]) -> ValidationReport {
    let issues = policies
        .iter()
        .flat_map(|policy| {
            validate_policy(expected, policy)
                .into_iter()
                .map(move |message| ValidationIssue {
                    policy_id: policy.id.clone(),
                    policy_name: policy.name.clone(),
                    message,
                })
        })
        .collect();

    ValidationReport { issues }
}

/// Problems with one record, as messages
pub fn validate_policy(expected: PolicyKind, policy: &StoredPolicy) -> Vec<String> {
    let mut errors = Vec::new();

    if policy.kind != expected {
        errors.push(format!(
            "Invalid policy kind: expected {}, got {}",
            expected, policy.kind
        ));
        return errors;
    }

    if policy.payload.kind() != policy.kind {
        errors.push(format!(
            "Invalid policy kind: envelope is {} but payload is {}",
            policy.kind,
            policy.payload.kind()
        ));
        return errors;
    }

    match &policy.payload {
        PolicyPayload::Resource(doc) => {
            if doc.kind != RESOURCE_POLICY_KIND {
                errors.push(format!("Invalid policy kind: document kind is '{}'", doc.kind));
            }
            if !has_name(doc.metadata.name.as_deref()) {
                errors.push("missing metadata.name".to_string());
            }
            if doc.spec.resource.trim().is_empty() {
                errors.push("spec.resource must not be empty".to_string());
            }
            for (i, rule) in doc.spec.rules.iter().enumerate() {
                let label = rule
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("#{}", i));
                if rule.actions.is_empty() {
                    errors.push(format!("rule {} has no actions", label));
                }
                if let Some(message) = condition_error(rule.condition.as_ref()) {
                    errors.push(format!("rule {} has an invalid condition: {}", label, message));
                }
            }
        }
        PolicyPayload::DerivedRoles(doc) => {
            if doc.kind != DERIVED_ROLES_KIND {
                errors.push(format!("Invalid policy kind: document kind is '{}'", doc.kind));
            }
            if !has_name(doc.metadata.name.as_deref()) {
                errors.push("missing metadata.name".to_string());
            }
            if doc.spec.definitions.is_empty() {
                errors.push("spec.definitions must not be empty".to_string());
            }

            let mut seen = HashSet::new();
            for (i, def) in doc.spec.definitions.iter().enumerate() {
                if def.name.trim().is_empty() {
                    errors.push(format!("definition #{} has an empty name", i));
                } else if !seen.insert(def.name.as_str()) {
                    errors.push(format!("duplicate derived role '{}'", def.name));
                }
                if let Some(message) = condition_error(def.condition.as_ref()) {
                    errors.push(format!(
                        "derived role '{}' has an invalid condition: {}",
                        def.name, message
                    ));
                }
            }
        }
    }

    errors
}

fn has_name(name: Option<&str>) -> bool {
    name.map(|n| !n.trim().is_empty()).unwrap_or(false)
}

fn condition_error(condition: Option<&Condition>) -> Option<String> {
    condition
        .and_then(|c| cel::compile(c.expression()).err())
        .map(|e| e.to_string())
}
