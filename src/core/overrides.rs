//! Override policy and suppression.
//!
//! An override is a justified, time-boxed exception for one `rule:value` pair
//! on one file. Policy problems are themselves reported as O-family
//! diagnostics. Syntax and missing-field problems (O001, O002) disable the
//! override; expiry problems (O003, O004) are reported but the override
//! still suppresses its match.

use crate::core::codes;
use crate::core::constraint::{ConstraintValue, Rule, Severity};
use crate::core::tags::{OverrideTag, TagError};
use crate::core::time::parse_iso_date;
use crate::core::violation::Violation;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverridePolicy {
    /// Fields every override must carry: `reason`, `expires`, `ticket`, `approved_by`.
    pub required_fields: Vec<String>,
    pub warn_no_expiry: bool,
    pub max_expiry_days: i64,
    pub fail_on_expired: bool,
    /// Zero disables the limit.
    pub max_per_file: usize,
}

impl Default for OverridePolicy {
    fn default() -> Self {
        Self {
            required_fields: vec!["reason".to_string()],
            warn_no_expiry: true,
            max_expiry_days: 180,
            fail_on_expired: true,
            max_per_file: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideIssue {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverrideCheck {
    /// No errors at all.
    pub valid: bool,
    /// May suppress matching violations (no O001/O002 errors).
    pub suppresses: bool,
    pub errors: Vec<OverrideIssue>,
    pub warnings: Vec<OverrideIssue>,
}

pub fn validate_override(tag: &OverrideTag, policy: &OverridePolicy, today: NaiveDate) -> OverrideCheck {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if Rule::from_name(&tag.rule).is_none() {
        errors.push(OverrideIssue {
            code: codes::O001_INVALID_SYNTAX,
            message: format!("override names unknown rule '{}'", tag.rule),
        });
    }

    for field in &policy.required_fields {
        let present = match field.as_str() {
            "reason" => tag.reason.is_some(),
            "expires" => tag.expires.is_some(),
            "ticket" => tag.ticket.is_some(),
            "approved_by" | "approvedBy" | "approved-by" => tag.approved_by.is_some(),
            _ => true,
        };
        if !present {
            errors.push(OverrideIssue {
                code: codes::O002_MISSING_FIELD,
                message: format!("override {}:{} is missing required @{}", tag.rule, tag.value, field),
            });
        }
    }

    match tag.expires.as_deref() {
        None => {
            if policy.warn_no_expiry {
                warnings.push(OverrideIssue {
                    code: codes::W003_OVERRIDE_NO_EXPIRY,
                    message: format!("override {}:{} has no @expires date", tag.rule, tag.value),
                });
            }
        }
        Some(raw) => match parse_iso_date(raw) {
            None => errors.push(OverrideIssue {
                code: codes::O001_INVALID_SYNTAX,
                message: format!("@expires '{}' is not an ISO date (YYYY-MM-DD)", raw),
            }),
            Some(date) if date < today => {
                let issue = OverrideIssue {
                    code: codes::O003_EXPIRED,
                    message: format!("override {}:{} expired on {}", tag.rule, tag.value, date),
                };
                if policy.fail_on_expired {
                    errors.push(issue);
                } else {
                    warnings.push(issue);
                }
            }
            Some(date) => {
                let days = (date - today).num_days();
                if days > policy.max_expiry_days {
                    errors.push(OverrideIssue {
                        code: codes::O004_EXPIRY_TOO_FAR,
                        message: format!(
                            "override {}:{} expires in {} days (policy allows at most {})",
                            tag.rule, tag.value, days, policy.max_expiry_days
                        ),
                    });
                }
            }
        },
    }

    let suppresses = !errors
        .iter()
        .any(|e| e.code == codes::O001_INVALID_SYNTAX || e.code == codes::O002_MISSING_FIELD);
    OverrideCheck {
        valid: errors.is_empty(),
        suppresses,
        errors,
        warnings,
    }
}

/// True when `tag` targets this violation: exact rule, value by string or
/// set equality.
pub fn override_matches(tag: &OverrideTag, violation: &Violation) -> bool {
    tag.rule == violation.rule && violation.value.matches_override(&tag.value)
}

/// Violations split by the override engine.
#[derive(Debug, Clone, Default)]
pub struct OverrideOutcome {
    pub kept: Vec<Violation>,
    pub overridden: Vec<Violation>,
    /// O-family diagnostics about the overrides themselves.
    pub issues: Vec<Violation>,
}

impl OverrideOutcome {
    pub fn overrides_count(&self) -> usize {
        self.overridden.len()
    }
}

/// Validates every override against `policy` and removes the violations
/// they legitimately suppress.
pub fn apply_overrides(
    diagnostics: Vec<Violation>,
    overrides: &[OverrideTag],
    policy: &OverridePolicy,
    today: NaiveDate,
) -> OverrideOutcome {
    let mut issues = Vec::new();
    let mut active: Vec<&OverrideTag> = Vec::new();

    for (idx, tag) in overrides.iter().enumerate() {
        let check = validate_override(tag, policy, today);
        for err in &check.errors {
            issues.push(override_issue(tag, err, Severity::Error));
        }
        for warn in &check.warnings {
            issues.push(override_issue(tag, warn, Severity::Warning));
        }
        if policy.max_per_file > 0 && idx >= policy.max_per_file {
            if idx == policy.max_per_file {
                issues.push(override_issue(
                    tag,
                    &OverrideIssue {
                        code: codes::O005_LIMIT_EXCEEDED,
                        message: format!(
                            "{} overrides in one file; the limit is {}",
                            overrides.len(),
                            policy.max_per_file
                        ),
                    },
                    Severity::Error,
                ));
            }
            continue;
        }
        if check.suppresses {
            active.push(tag);
        }
    }

    let (overridden, kept): (Vec<_>, Vec<_>) = diagnostics
        .into_iter()
        .partition(|v| is_overridable(v) && active.iter().any(|tag| override_matches(tag, v)));

    OverrideOutcome {
        kept,
        overridden,
        issues,
    }
}

/// Constraint and intent diagnostics are overridable; system, security and
/// override diagnostics are not.
fn is_overridable(violation: &Violation) -> bool {
    violation.code.starts_with('E') || violation.code.starts_with('I')
}

fn override_issue(tag: &OverrideTag, issue: &OverrideIssue, severity: Severity) -> Violation {
    Violation::system(
        issue.code,
        "override",
        severity,
        issue.message.clone(),
        fix_for(issue.code),
    )
    .with_value(ConstraintValue::Text(format!("{}:{}", tag.rule, tag.value)))
    .at(tag.line)
}

/// Malformed tag lines from the extractor, as diagnostics.
pub fn tag_error_violation(error: &TagError) -> Violation {
    let rule = if error.code.starts_with('O') { "override" } else { "tag" };
    Violation::system(
        error.code,
        rule,
        Severity::Error,
        error.message.clone(),
        fix_for(error.code),
    )
    .at(error.line)
}

fn fix_for(code: &str) -> &'static str {
    match code {
        codes::O001_INVALID_SYNTAX => {
            "Use '@override <rule>:<value>' followed by '@reason', '@expires YYYY-MM-DD' lines"
        }
        codes::O002_MISSING_FIELD => "Add the missing field below the @override line",
        codes::O003_EXPIRED => "Fix the underlying violation or renew the override with a new @expires date",
        codes::O004_EXPIRY_TOO_FAR => "Pick an @expires date within the policy window",
        codes::O005_LIMIT_EXCEEDED => "Fix some violations or promote the recurring exception to an intent",
        codes::W003_OVERRIDE_NO_EXPIRY => "Add '@expires YYYY-MM-DD' so the exception is revisited",
        _ => "Fix the tag syntax",
    }
}
