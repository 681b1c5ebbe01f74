//! Architecture resolution: flattens an inheritance chain and its mixins into
//! one ordered, deduplicated constraint list.
//!
//! # Merge policy
//!
//! Nodes are applied root to leaf; inside one node, mixin constraints (in
//! declaration order) come before the node's own constraints.
//!
//! - `allow_*` rules strip equal entries from inherited `forbid_*` constraints.
//! - Singleton rules (limits, naming, location, base class) keep one instance;
//!   the occurrence closer to the leaf replaces the earlier one in place.
//! - List values of the same rule and severity are unioned; metadata
//!   (`why`, `alternatives`, rule-specific fields) comes from the later one.
//! - List values of the same rule with a different severity: overlapping
//!   entries move to the later constraint.
//! - Other scalar values replace an equal earlier value and otherwise coexist.
//!
//! Everything operates on `Vec`s in a fixed order, so the result never depends
//! on map iteration order.

use crate::core::constraint::{Constraint, ConstraintValue, Rule};
use crate::core::error::ResolutionError;
use crate::core::registry::{ArchitectureNode, Registry};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub expand_mixins: bool,
    pub resolve_inherits: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            expand_mixins: true,
            resolve_inherits: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deprecation {
    pub since: String,
    pub migration_guide: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlattenedArchitecture {
    pub arch_id: String,
    /// Root-to-leaf ancestor ids, ending with `arch_id`.
    pub inheritance_chain: Vec<String>,
    pub applied_mixins: Vec<String>,
    pub constraints: Vec<Constraint>,
    /// Chain order, most specific last; not deduplicated.
    pub hints: Vec<String>,
    pub description: Option<String>,
    pub rationale: Option<String>,
    pub deprecation: Option<Deprecation>,
}

impl FlattenedArchitecture {
    pub fn constraints_for(&self, rule: Rule) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(move |c| c.rule == rule.as_str())
    }
}

pub fn resolve(
    registry: &Registry,
    arch_id: &str,
    options: ResolveOptions,
) -> Result<FlattenedArchitecture, ResolutionError> {
    let chain = walk_chain(registry, arch_id, options.resolve_inherits)?;
    let nodes: Vec<&ArchitectureNode> = chain.iter().filter_map(|id| registry.get(id)).collect();

    let mut constraints: Vec<Constraint> = Vec::new();
    let mut hints = Vec::new();
    let mut applied_mixins: Vec<String> = Vec::new();

    for node in &nodes {
        if options.expand_mixins {
            for mixin_ref in &node.mixins {
                let mixin = registry.mixins.get(mixin_ref.name()).ok_or_else(|| {
                    ResolutionError::MissingMixin {
                        arch_id: node.id.clone(),
                        mixin: mixin_ref.name().to_string(),
                    }
                })?;
                let empty = BTreeMap::new();
                let params = mixin_ref.params().unwrap_or(&empty);
                for constraint in &mixin.constraints {
                    let mut c = constraint.substitute(params);
                    c.source = Some(format!("mixin:{}", mixin.name));
                    merge_constraint(&mut constraints, c);
                }
                hints.extend(mixin.hints.iter().cloned());
                if !applied_mixins.iter().any(|m| m == &mixin.name) {
                    applied_mixins.push(mixin.name.clone());
                }
            }
        }
        for constraint in &node.constraints {
            let mut c = constraint.clone();
            c.source = Some(node.id.clone());
            merge_constraint(&mut constraints, c);
        }
        hints.extend(node.hints.iter().cloned());
    }

    let leaf = nodes.last().copied();
    let description = nodes.iter().rev().find_map(|n| n.description.clone());
    let deprecation = leaf.and_then(|n| {
        n.deprecated_from.as_ref().map(|since| Deprecation {
            since: since.clone(),
            migration_guide: n.migration_guide.clone(),
        })
    });

    debug!(
        arch_id,
        depth = chain.len(),
        constraints = constraints.len(),
        "architecture resolved"
    );

    Ok(FlattenedArchitecture {
        arch_id: arch_id.to_string(),
        inheritance_chain: chain,
        applied_mixins,
        constraints,
        hints,
        description,
        rationale: leaf.and_then(|n| n.rationale.clone()),
        deprecation,
    })
}

/// Resolves every registered id. A broken node only fails the ids that
/// depend on it.
pub fn resolve_all(
    registry: &Registry,
    options: ResolveOptions,
) -> BTreeMap<String, Result<FlattenedArchitecture, ResolutionError>> {
    registry
        .ids()
        .map(|id| (id.to_string(), resolve(registry, id, options)))
        .collect()
}

/// Walks `inherits` pointers to the root and returns the chain root-first.
/// Cycles are caught with a seen-set, so any acyclic depth is accepted.
fn walk_chain(
    registry: &Registry,
    arch_id: &str,
    follow_inherits: bool,
) -> Result<Vec<String>, ResolutionError> {
    let mut chain: Vec<String> = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut current = Some(arch_id.to_string());

    while let Some(id) = current {
        if !seen.insert(id.clone()) {
            chain.push(id.clone());
            return Err(ResolutionError::CircularInheritance { id, chain });
        }
        let node = registry
            .get(&id)
            .ok_or_else(|| ResolutionError::UnknownArch {
                id: id.clone(),
                chain: chain.clone(),
            })?;
        chain.push(id);
        current = if follow_inherits {
            node.inherits.clone()
        } else {
            None
        };
    }

    chain.reverse();
    Ok(chain)
}

fn merge_constraint(acc: &mut Vec<Constraint>, incoming: Constraint) {
    let rule = incoming.known_rule();

    if let Some(target) = rule.and_then(Rule::negates) {
        apply_negation(acc, target, &incoming.value);
    }

    if rule.is_some_and(Rule::is_singleton) {
        if let Some(pos) = acc.iter().position(|c| c.rule == incoming.rule) {
            acc[pos] = incoming;
        } else {
            acc.push(incoming);
        }
        return;
    }

    if let ConstraintValue::List(new_items) = incoming.value.clone() {
        // Different severity: the later constraint takes over shared entries.
        for existing in acc.iter_mut() {
            if existing.rule != incoming.rule || existing.severity == incoming.severity {
                continue;
            }
            if let ConstraintValue::List(items) = &mut existing.value {
                items.retain(|i| !new_items.contains(i));
            }
        }
        acc.retain(|c| {
            c.rule != incoming.rule
                || c.severity == incoming.severity
                || !matches!(&c.value, ConstraintValue::List(items) if items.is_empty())
        });

        let same = acc.iter().position(|c| {
            c.rule == incoming.rule
                && c.severity == incoming.severity
                && matches!(c.value, ConstraintValue::List(_))
        });
        if let Some(pos) = same {
            let mut union = match &acc[pos].value {
                ConstraintValue::List(items) => items.clone(),
                _ => Vec::new(),
            };
            for item in new_items {
                if !union.contains(&item) {
                    union.push(item);
                }
            }
            let mut merged = incoming;
            merged.value = ConstraintValue::List(union);
            acc[pos] = merged;
        } else {
            acc.push(incoming);
        }
        return;
    }

    if let Some(pos) = acc
        .iter()
        .position(|c| c.rule == incoming.rule && c.value == incoming.value)
    {
        acc[pos] = incoming;
    } else {
        acc.push(incoming);
    }
}

fn apply_negation(acc: &mut Vec<Constraint>, target: Rule, allowed: &ConstraintValue) {
    let Some(allowed) = allowed.as_list() else {
        return;
    };
    for existing in acc.iter_mut() {
        if existing.rule != target.as_str() {
            continue;
        }
        if let ConstraintValue::List(items) = &mut existing.value {
            items.retain(|i| !allowed.contains(&i.as_str()));
        }
    }
    acc.retain(|c| {
        if c.rule != target.as_str() {
            return true;
        }
        match &c.value {
            ConstraintValue::List(items) => !items.is_empty(),
            ConstraintValue::Text(text) => !allowed.contains(&text.as_str()),
            _ => true,
        }
    });
}
