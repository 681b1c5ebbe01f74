//! Override audit: health totals and recurring-exception clusters.

use crate::core::overrides::{OverridePolicy, validate_override};
use crate::core::tags::OverrideTag;
use crate::core::time::{now_rfc3339, parse_iso_date};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overrides expiring within this many days count as "expiring soon".
pub const EXPIRING_SOON_DAYS: i64 = 30;

/// Minimum number of distinct files before a `rule:value` key is a cluster.
pub const CLUSTER_MIN_FILES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub path: String,
    pub tag: OverrideTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideState {
    Active,
    ExpiringSoon,
    Expired,
    NoExpiry,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub path: String,
    pub line: usize,
    pub key: String,
    pub state: OverrideState,
    pub reason: Option<String>,
    pub expires: Option<String>,
    pub days_left: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTotals {
    pub total: usize,
    pub active: usize,
    pub expiring_soon: usize,
    pub expired: usize,
    pub missing_expiry: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideCluster {
    pub key: String,
    pub rule: String,
    pub value: String,
    pub files: Vec<String>,
    pub reasons: Vec<String>,
    pub suggested_intent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub generated_at: String,
    pub totals: AuditTotals,
    pub entries: Vec<AuditEntry>,
    pub clusters: Vec<OverrideCluster>,
}

pub fn audit_overrides(records: &[OverrideRecord], policy: &OverridePolicy, today: NaiveDate) -> AuditReport {
    let mut totals = AuditTotals {
        total: records.len(),
        ..AuditTotals::default()
    };
    let mut entries = Vec::with_capacity(records.len());
    let mut by_key: BTreeMap<String, Vec<&OverrideRecord>> = BTreeMap::new();

    for record in records {
        let tag = &record.tag;
        let key = format!("{}:{}", tag.rule, tag.value);
        let expiry = tag.expires.as_deref().and_then(parse_iso_date);
        let days_left = expiry.map(|d| (d - today).num_days());
        let check = validate_override(tag, policy, today);

        let state = if !check.suppresses {
            OverrideState::Invalid
        } else {
            match days_left {
                None => OverrideState::NoExpiry,
                Some(d) if d < 0 => OverrideState::Expired,
                Some(d) if d <= EXPIRING_SOON_DAYS => OverrideState::ExpiringSoon,
                Some(_) => OverrideState::Active,
            }
        };
        match state {
            OverrideState::Active => totals.active += 1,
            OverrideState::ExpiringSoon => {
                totals.active += 1;
                totals.expiring_soon += 1;
            }
            OverrideState::Expired => totals.expired += 1,
            OverrideState::NoExpiry => {
                totals.active += 1;
                totals.missing_expiry += 1;
            }
            OverrideState::Invalid => totals.invalid += 1,
        }

        entries.push(AuditEntry {
            path: record.path.clone(),
            line: tag.line,
            key: key.clone(),
            state,
            reason: tag.reason.clone(),
            expires: tag.expires.clone(),
            days_left,
        });
        by_key.entry(key).or_default().push(record);
    }

    let mut clusters: Vec<OverrideCluster> = by_key
        .into_iter()
        .filter_map(|(key, group)| {
            let mut files: Vec<String> = group.iter().map(|r| r.path.clone()).collect();
            files.sort();
            files.dedup();
            if files.len() < CLUSTER_MIN_FILES {
                return None;
            }
            let mut reasons: Vec<String> = group.iter().filter_map(|r| r.tag.reason.clone()).collect();
            reasons.sort();
            reasons.dedup();
            let (rule, value) = (group[0].tag.rule.clone(), group[0].tag.value.clone());
            Some(OverrideCluster {
                suggested_intent: suggest_intent_name(&rule, &value),
                key,
                rule,
                value,
                files,
                reasons,
            })
        })
        .collect();
    clusters.sort_by(|a, b| b.files.len().cmp(&a.files.len()).then_with(|| a.key.cmp(&b.key)));

    AuditReport {
        generated_at: now_rfc3339(),
        totals,
        entries,
        clusters,
    }
}

/// Intent name for promoting a recurring exception, e.g.
/// `forbid_import:axios` -> `uses-axios`.
pub fn suggest_intent_name(rule: &str, value: &str) -> String {
    let subject = slug(value);
    match rule {
        "forbid_import" => format!("uses-{}", subject),
        "forbid_call" => format!("calls-{}", subject),
        "forbid_mutation" => format!("mutates-{}", subject),
        "forbid_pattern" => "allows-pattern".to_string(),
        "max_file_lines" | "max_function_lines" => "large-module".to_string(),
        "max_public_methods" => "wide-interface".to_string(),
        "require_test_file" | "require_coverage" => "untested".to_string(),
        "importable_by" => "shared-internal".to_string(),
        _ => format!("{}-{}", slug(rule), subject),
    }
}

fn slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
