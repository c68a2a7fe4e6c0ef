//! Process-wide caches.
//!
//! Two caches live for the whole process:
//!
//! - compiled setter bindings, keyed by (parent type, child type, navigation)
//! - required-member lists, keyed by entity type name
//!
//! Both are filled lazily with insert-if-absent semantics, so two threads
//! racing on the same key end up sharing whichever entry landed first. They
//! are only emptied by [`purge`], which the session calls when the driver
//! reports a stale cached plan.

use std::any::{Any, TypeId};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::error::QueryResult;
use crate::mapping::{EntityDescriptor, MemberDescriptor};

/// Attaches a decoded child object to its parent object.
pub type Setter =
    Arc<dyn Fn(&mut (dyn Any + Send), Box<dyn Any + Send>) -> QueryResult<()> + Send + Sync>;

/// Identity of one navigation between two entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetterKey {
    pub parent: TypeId,
    pub child: TypeId,
    pub navigation: &'static str,
}

static SETTERS: LazyLock<DashMap<SetterKey, Setter>> = LazyLock::new(DashMap::new);

static REQUIRED: LazyLock<DashMap<&'static str, Arc<[&'static MemberDescriptor]>>> =
    LazyLock::new(DashMap::new);

/// Cached setter for `key`, built by `build` on first use.
pub fn setter(key: SetterKey, build: impl FnOnce() -> Setter) -> Setter {
    SETTERS.entry(key).or_insert_with(build).value().clone()
}

/// Members of `entity` marked as required.
pub fn required_members(entity: &'static EntityDescriptor) -> Arc<[&'static MemberDescriptor]> {
    REQUIRED
        .entry(entity.type_name)
        .or_insert_with(|| entity.mapped_members().filter(|m| m.required).collect())
        .value()
        .clone()
}

/// Drop every cached entry.
pub fn purge() {
    SETTERS.clear();
    REQUIRED.clear();
    tracing::debug!("quarry caches purged");
}

/// Number of cached setters.
pub fn setter_count() -> usize {
    SETTERS.len()
}
