//! Request Validation - Rule/Policy Separation
//!
//! Rules produce structured violations.
//! Policy decides whether warnings block a run.

use serde::{Deserialize, Serialize};

use crate::identifier::sanitize;
use crate::request::GenerationRequest;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationViolation {
    pub rule: String,
    pub field: String,
    pub severity: ViolationSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.violations
            .iter()
            .filter(|v| v.severity == ViolationSeverity::Warning)
    }

    /// `rule: message` pairs joined for an error message.
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.rule, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Whether warning-level violations block generation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WarningPolicy {
    #[default]
    Allow,
    Deny,
}

/// Validation rule trait - produces violations
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, request: &GenerationRequest) -> Vec<ValidationViolation>;
}

fn violation(
    rule: &dyn ValidationRule,
    field: &str,
    severity: ViolationSeverity,
    message: String,
) -> ValidationViolation {
    ValidationViolation {
        rule: rule.name().to_string(),
        field: field.to_string(),
        severity,
        message,
    }
}

// --- Concrete Rules ---

pub struct TokenRule;

impl ValidationRule for TokenRule {
    fn name(&self) -> &'static str { "token" }

    fn validate(&self, request: &GenerationRequest) -> Vec<ValidationViolation> {
        if sanitize(&request.raw_name).is_empty() {
            vec![violation(
                self,
                "rawName",
                ViolationSeverity::Error,
                format!(
                    "module name {:?} contains no characters from [A-Za-z0-9_]",
                    request.raw_name
                ),
            )]
        } else {
            vec![]
        }
    }
}

pub struct RequiredFieldsRule;

impl ValidationRule for RequiredFieldsRule {
    fn name(&self) -> &'static str { "required_fields" }

    fn validate(&self, request: &GenerationRequest) -> Vec<ValidationViolation> {
        request
            .fields
            .entries()
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| {
                violation(self, field, ViolationSeverity::Error, format!("{field} is required"))
            })
            .collect()
    }
}

pub struct EmailShapeRule;

impl ValidationRule for EmailShapeRule {
    fn name(&self) -> &'static str { "email_shape" }

    fn validate(&self, request: &GenerationRequest) -> Vec<ValidationViolation> {
        let email = request.fields.email.trim();
        if email.is_empty() {
            return vec![];
        }

        let well_formed = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            }
            None => false,
        };

        if well_formed {
            vec![]
        } else {
            vec![violation(
                self,
                "email",
                ViolationSeverity::Warning,
                format!("{email:?} does not look like an email address"),
            )]
        }
    }
}

pub struct HomepageSchemeRule;

impl ValidationRule for HomepageSchemeRule {
    fn name(&self) -> &'static str { "homepage_scheme" }

    fn validate(&self, request: &GenerationRequest) -> Vec<ValidationViolation> {
        let homepage = request.fields.homepage.trim();
        if homepage.is_empty() {
            return vec![];
        }

        let has_host = ["http://", "https://"]
            .iter()
            .filter_map(|scheme| homepage.strip_prefix(scheme))
            .any(|rest| !rest.is_empty());

        if has_host {
            vec![]
        } else {
            vec![violation(
                self,
                "homepage",
                ViolationSeverity::Warning,
                format!("{homepage:?} is not an http(s) URL"),
            )]
        }
    }
}

/// Validator orchestrates rules and applies policy
pub struct RequestValidator {
    rules: Vec<Box<dyn ValidationRule>>,
    policy: WarningPolicy,
}

impl RequestValidator {
    pub fn new(policy: WarningPolicy) -> Self {
        Self {
            rules: vec![
                Box::new(TokenRule),
                Box::new(RequiredFieldsRule),
                Box::new(EmailShapeRule),
                Box::new(HomepageSchemeRule),
            ],
            policy,
        }
    }

    pub fn validate(&self, request: &GenerationRequest) -> ValidationResult {
        let violations: Vec<_> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(request))
            .collect();

        let blocked = violations.iter().any(|v| match v.severity {
            ViolationSeverity::Error => true,
            ViolationSeverity::Warning => self.policy == WarningPolicy::Deny,
        });

        ValidationResult {
            valid: !blocked,
            violations,
        }
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new(WarningPolicy::default())
    }
}
