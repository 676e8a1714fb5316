//! Provider registry: providers by key, group memberships, decorators.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::analyzer::{AnyArc, ConstructorInfo, Dependency, Products, ReturnSpec};
use crate::container::context::ResolverContext;
use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::lifetime::Lifetime;

/// Erased constructor: resolves dependencies and yields the provider's
/// products.
pub(crate) type ProduceFn =
    Arc<dyn for<'a> Fn(&ResolverContext<'a>) -> DiResult<Products> + Send + Sync>;

/// Erased decorator application.
pub(crate) type ApplyFn =
    Arc<dyn for<'a> Fn(AnyArc, &ResolverContext<'a>) -> DiResult<AnyArc> + Send + Sync>;

/// Dense provider handle; index into the registry's record table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ProviderId(pub(crate) u32);

/// Immutable description of how to produce a service. Frozen at build.
pub(crate) struct ProviderRecord {
    pub(crate) id: ProviderId,
    /// Primary service identity; used for caches, cycle paths, errors.
    pub(crate) key: Key,
    pub(crate) lifetime: Lifetime,
    pub(crate) info: Arc<ConstructorInfo>,
    /// Effective outputs after registration options are applied.
    pub(crate) outputs: Vec<ReturnSpec>,
    /// Groups the primary output joined via registration options.
    pub(crate) groups: Vec<&'static str>,
    pub(crate) produce: ProduceFn,
}

pub(crate) struct DecoratorRecord {
    pub(crate) target: TypeId,
    pub(crate) target_name: &'static str,
    pub(crate) deps: Vec<Dependency>,
    pub(crate) apply: ApplyFn,
}

/// In-memory store of providers, groups, and decorators.
pub(crate) struct Registry {
    records: Vec<ProviderRecord>,
    by_key: HashMap<Key, ProviderId, ahash::RandomState>,
    groups: HashMap<(TypeId, &'static str), Vec<ProviderId>, ahash::RandomState>,
    decorators: HashMap<TypeId, Vec<DecoratorRecord>, ahash::RandomState>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            records: Vec::new(),
            by_key: HashMap::with_hasher(ahash::RandomState::new()),
            groups: HashMap::with_hasher(ahash::RandomState::new()),
            decorators: HashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Registers a provider. Non-grouped outputs claim their `(type, key)`
    /// slot exclusively; grouped outputs append to their group in
    /// registration order and never collide.
    pub(crate) fn register_provider(
        &mut self,
        lifetime: Lifetime,
        info: Arc<ConstructorInfo>,
        outputs: Vec<ReturnSpec>,
        groups: Vec<&'static str>,
        produce: ProduceFn,
    ) -> DiResult<ProviderId> {
        let id = ProviderId(self.records.len() as u32);
        let primary = outputs.first().ok_or_else(|| DiError::Validation {
            service: "<unknown>",
            reason: "constructor produces no services".to_string(),
        })?;
        let primary_key = spec_key(primary);

        for (index, output) in outputs.iter().enumerate() {
            // Field-level group tags (result-object fields) are reached
            // through their group only.
            if let Some(group) = output.group {
                self.groups.entry((output.ty, group)).or_default().push(id);
                continue;
            }
            // Provider-level group options apply to the primary output.
            let provider_grouped = index == 0 && !groups.is_empty();
            if provider_grouped {
                for group in &groups {
                    self.groups.entry((output.ty, group)).or_default().push(id);
                }
            }
            // An unkeyed grouped provider does not claim the plain
            // `(type, key)` slot; a keyed one stays resolvable by key as
            // well as through its groups.
            if provider_grouped && output.key.is_none() {
                continue;
            }
            let key = spec_key(output);
            if self.by_key.contains_key(&key) {
                return Err(DiError::DuplicateRegistration {
                    type_name: key.display_name(),
                    key: key.service_key(),
                });
            }
            self.by_key.insert(key, id);
        }

        self.records.push(ProviderRecord {
            id,
            key: primary_key,
            lifetime,
            info,
            outputs,
            groups,
            produce,
        });
        Ok(id)
    }

    pub(crate) fn provider_for(&self, key: &Key) -> Option<&ProviderRecord> {
        self.by_key.get(key).map(|id| &self.records[id.0 as usize])
    }

    pub(crate) fn record(&self, id: ProviderId) -> &ProviderRecord {
        &self.records[id.0 as usize]
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &ProviderRecord> {
        self.records.iter()
    }

    /// Members of a group, in registration order.
    pub(crate) fn group_providers(&self, elem: TypeId, group: &'static str) -> Vec<ProviderId> {
        self.groups.get(&(elem, group)).cloned().unwrap_or_default()
    }

    pub(crate) fn register_decorator(&mut self, decorator: DecoratorRecord) {
        self.decorators
            .entry(decorator.target)
            .or_default()
            .push(decorator);
    }

    pub(crate) fn decorators_for(&self, target: TypeId) -> &[DecoratorRecord] {
        self.decorators
            .get(&target)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn decorators(&self) -> impl Iterator<Item = &DecoratorRecord> {
        self.decorators.values().flatten()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    #[allow(dead_code)]
    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.by_key.clear();
        self.groups.clear();
        self.decorators.clear();
    }
}

pub(crate) fn spec_key(spec: &ReturnSpec) -> Key {
    match spec.key {
        Some(k) => Key::Keyed(spec.ty, spec.type_name, k),
        None => Key::Type(spec.ty, spec.type_name),
    }
}
