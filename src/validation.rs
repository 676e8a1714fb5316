//! Build-time validation.
//!
//! Runs after the registry and graph are assembled, before any singleton
//! is constructed:
//! - the graph is acyclic;
//! - every non-optional, non-group dependency has a provider;
//! - dependency tags are sane (a field cannot be both keyed and grouped,
//!   a group dependency cannot be optional);
//! - no provider captures a dependency with a shorter lifetime.
//!
//! Constructor shape rules that a reflective host checks at runtime —
//! returns at least one non-error value, the error comes last, a
//! parameter object is the only parameter — are enforced here by the
//! constructor trait bounds at compile time instead.

use tracing::{debug, warn};

use crate::error::{DiError, DiResult};
use crate::graph::DependencyGraph;
use crate::lifetime::Lifetime;
use crate::registry::Registry;

#[tracing::instrument(skip_all, name = "graph_validation")]
pub(crate) fn validate(registry: &Registry, graph: &mut DependencyGraph) -> DiResult<()> {
    debug!(provider_count = registry.len(), "validating dependency graph");

    graph.detect_cycles()?;

    for record in registry.records() {
        for dep in &record.info.params {
            if dep.key.is_some() && dep.group.is_some() {
                return Err(DiError::Validation {
                    service: record.key.display_name(),
                    reason: format!(
                        "dependency {} cannot be both keyed and grouped",
                        dep.type_name
                    ),
                });
            }
            if dep.optional && dep.group.is_some() {
                return Err(DiError::Validation {
                    service: record.key.display_name(),
                    reason: format!(
                        "group dependency {} cannot be optional; an empty group is already legal",
                        dep.type_name
                    ),
                });
            }
            if dep.group.is_some() || dep.optional {
                continue;
            }
            if registry.provider_for(&dep.lookup_key()).is_none() {
                warn!(
                    consumer = %record.key,
                    dependency = %dep.lookup_key(),
                    "missing required dependency"
                );
                return Err(DiError::Validation {
                    service: record.key.display_name(),
                    reason: format!(
                        "required dependency {} is not registered",
                        dep.lookup_key()
                    ),
                });
            }
        }
        // A single result-object field cannot carry both tags. The
        // registration options `keyed` and `in_group` are orthogonal and
        // never meet on one output spec: the key rides on the primary
        // output, provider-level group membership lives in the registry.
        for output in &record.outputs {
            if output.key.is_some() && output.group.is_some() {
                return Err(DiError::Validation {
                    service: record.key.display_name(),
                    reason: format!(
                        "result-object field {} cannot be both keyed and grouped",
                        output.type_name
                    ),
                });
            }
        }
    }

    // Decorators declare dependencies like constructors do.
    for decorator in registry.decorators() {
        for dep in &decorator.deps {
            if dep.group.is_some() || dep.optional {
                continue;
            }
            if registry.provider_for(&dep.lookup_key()).is_none() {
                return Err(DiError::Validation {
                    service: decorator.target_name,
                    reason: format!(
                        "decorator dependency {} is not registered",
                        dep.lookup_key()
                    ),
                });
            }
        }
    }

    // A dependency must live at least as long as its consumer. Checking
    // every edge covers transitive closures by induction: any violating
    // chain contains a first edge that already violates the rule.
    for record in registry.records() {
        if record.lifetime == Lifetime::Transient {
            continue;
        }
        for dep_id in graph.dependencies_of(record.id) {
            let dependency = registry.record(dep_id);
            if !dependency.lifetime.satisfies(record.lifetime) {
                warn!(
                    consumer = %record.key,
                    consumer_lifetime = %record.lifetime,
                    dependency = %dependency.key,
                    dependency_lifetime = %dependency.lifetime,
                    "lifetime conflict"
                );
                return Err(DiError::LifetimeConflict {
                    service: record.key.display_name(),
                    lifetime: record.lifetime,
                    dependency: dependency.key.display_name(),
                    dependency_lifetime: dependency.lifetime,
                });
            }
        }
    }

    debug!("dependency graph validation passed");
    Ok(())
}
