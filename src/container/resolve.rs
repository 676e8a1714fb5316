//! The resolution engine.
//!
//! Turns a requested `(type, key)` pair into an instance: provider
//! lookup, per-lifetime cache probe, per-thread cycle detection,
//! recursive dependency resolution through the constructor, decorator
//! application, caching, and lifetime tracking.
//!
//! Locking discipline: no lock is held while a user constructor runs.
//! The per-scope cell map is locked only long enough to fetch the
//! provider's single-flight cell; concurrent first resolutions of the
//! same service block on that cell, everything else proceeds in
//! parallel.

use std::any::TypeId;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;

use crate::analyzer::{AnyArc, Products};
use crate::container::context::ResolverContext;
use crate::container::scope::ScopeInner;
use crate::error::{DiError, DiResult};
use crate::internal::ResolutionFrame;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::registry::{ProviderId, ProviderRecord};

impl ScopeInner {
    /// Resolves a single service by key, emitting observer events.
    pub(crate) fn resolve_key(&self, key: &Key) -> DiResult<AnyArc> {
        if !self.shared.observers.has_observers() {
            return self.resolve_key_inner(key);
        }
        let started = Instant::now();
        let result = self.resolve_key_inner(key);
        match &result {
            Ok(_) => self.shared.observers.resolved(key, started.elapsed()),
            Err(err) => self.shared.observers.error(key, err),
        }
        result
    }

    fn resolve_key_inner(&self, key: &Key) -> DiResult<AnyArc> {
        self.ensure_active()?;
        let Some(record) = self.shared.registry.provider_for(key) else {
            return Err(DiError::NotFound {
                type_name: key.display_name(),
                key: key.service_key(),
            });
        };
        let products = self.resolve_record(record)?;
        products
            .iter()
            .find(|p| p.key == *key)
            .map(|p| p.value.clone())
            .ok_or(DiError::TypeMismatch(key.display_name()))
    }

    /// Resolves every member of a group, in registration order. An
    /// unregistered group is an empty collection, not an error.
    pub(crate) fn resolve_group(
        &self,
        elem: TypeId,
        elem_name: &'static str,
        group: &'static str,
    ) -> DiResult<Vec<AnyArc>> {
        if !self.shared.observers.has_observers() {
            return self.resolve_group_inner(elem, elem_name, group);
        }
        let group_key = Key::Type(elem, elem_name);
        let started = Instant::now();
        let result = self.resolve_group_inner(elem, elem_name, group);
        match &result {
            Ok(_) => self
                .shared
                .observers
                .resolved(&group_key, started.elapsed()),
            Err(err) => self.shared.observers.error(&group_key, err),
        }
        result
    }

    fn resolve_group_inner(
        &self,
        elem: TypeId,
        elem_name: &'static str,
        group: &'static str,
    ) -> DiResult<Vec<AnyArc>> {
        self.ensure_active()?;
        let ids = self.shared.registry.group_providers(elem, group);
        let mut members = Vec::with_capacity(ids.len());
        for id in ids {
            let record = self.shared.registry.record(id);
            let products = self.resolve_record(record)?;
            let product = products
                .iter()
                .find(|p| p.type_id() == elem && p.group == Some(group))
                .or_else(|| products.iter().find(|p| p.type_id() == elem))
                .ok_or(DiError::TypeMismatch(elem_name))?;
            members.push(product.value.clone());
        }
        Ok(members)
    }

    /// Resolves one provider's products, honoring its lifetime.
    pub(crate) fn resolve_record(&self, record: &ProviderRecord) -> DiResult<Arc<Products>> {
        match record.lifetime {
            Lifetime::Transient => {
                let _frame = ResolutionFrame::enter(record.key)?;
                self.construct(record).map(Arc::new)
            }
            Lifetime::Singleton | Lifetime::Scoped => {
                // Singletons are owned by the root scope; scoped services
                // by the scope the resolution originated in.
                let root;
                let owner: &ScopeInner =
                    if record.lifetime == Lifetime::Singleton && self.parent.is_some() {
                        root = self
                            .shared
                            .root_scope()
                            .ok_or(DiError::ContainerDisposed)?;
                        &root
                    } else {
                        self
                    };
                let cell = owner.cell_for(record.id);
                if let Some(cached) = cell.get() {
                    return Ok(cached.clone());
                }
                // The frame precedes cell initialization, so a chain that
                // curls back onto an in-flight provider on this thread
                // reports a cycle instead of deadlocking on the cell.
                let _frame = ResolutionFrame::enter(record.key)?;
                cell.get_or_try_init(|| owner.construct(record).map(Arc::new))
                    .map(Arc::clone)
            }
        }
    }

    /// Runs the constructor, applies decorators, and tracks disposables.
    /// `self` is the scope that owns the resulting instances.
    fn construct(&self, record: &ProviderRecord) -> DiResult<Products> {
        // The owning scope may have closed while we waited on the cell.
        self.ensure_active()?;
        let cx = ResolverContext::new(self);

        let mut products = (record.produce)(&cx).map_err(|err| match err {
            // Fill in the key the constructor was registered under; the
            // typed constructor wrapper cannot know it.
            DiError::Resolution {
                type_name,
                key: None,
                source,
            } => DiError::Resolution {
                type_name,
                key: record.key.service_key(),
                source,
            },
            other => other,
        })?;

        for product in products.iter_mut() {
            for decorator in self.shared.registry.decorators_for(product.type_id()) {
                product.value = (decorator.apply)(product.value.clone(), &cx)?;
            }
        }

        for product in &products {
            if let Some(disposer) = &product.disposer {
                self.tracker
                    .track(product.key, product.value.clone(), disposer.clone());
            }
        }

        Ok(products)
    }

    fn cell_for(&self, id: ProviderId) -> Arc<OnceCell<Arc<Products>>> {
        let mut cells = self.cells.lock();
        cells
            .entry(id)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}
