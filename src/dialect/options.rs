//! Typed, immutable datastore options

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A datastore option, identified by its type
///
/// ```
/// use gridbridge::dialect::options::{OptionsContext, TtlOption};
///
/// let options = OptionsContext::new().with::<TtlOption>(60);
/// assert_eq!(options.get::<TtlOption>(), Some(&60));
/// ```
pub trait DatastoreOption: 'static {
    /// Value carried by the option
    type Value: Any + Clone + fmt::Debug + Send + Sync;
}

/// How associations are laid out in document-like datastores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationStorageType {
    /// Rows embedded in the owning entity
    InEntity,
    /// Rows kept in a separate association document
    AssociationDocument,
}

/// Association layout option
#[derive(Debug, Clone, Copy)]
pub struct AssociationStorageOption;

impl DatastoreOption for AssociationStorageOption {
    type Value = AssociationStorageType;
}

/// Time to live of stored entries, in seconds
#[derive(Debug, Clone, Copy)]
pub struct TtlOption;

impl DatastoreOption for TtlOption {
    type Value = u64;
}

#[derive(Clone)]
struct OptionValue {
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    debug: fn(&(dyn Any + Send + Sync), &mut fmt::Formatter<'_>) -> fmt::Result,
}

fn debug_value<V: fmt::Debug + 'static>(
    value: &(dyn Any + Send + Sync),
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    match value.downcast_ref::<V>() {
        Some(v) => fmt::Debug::fmt(v, f),
        None => f.write_str("?"),
    }
}

static EMPTY: Lazy<Arc<OptionsContext>> = Lazy::new(|| Arc::new(OptionsContext::new()));

/// Option values effective for one entity type, association or property
#[derive(Clone, Default)]
pub struct OptionsContext {
    values: HashMap<TypeId, OptionValue>,
}

impl OptionsContext {
    /// Context without any option set
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared context without any option set
    pub fn empty() -> Arc<OptionsContext> {
        Arc::clone(&EMPTY)
    }

    /// Return a copy with option `O` set to `value`
    pub fn with<O: DatastoreOption>(mut self, value: O::Value) -> Self {
        self.values.insert(
            TypeId::of::<O>(),
            OptionValue {
                name: type_name::<O>(),
                value: Arc::new(value),
                debug: debug_value::<O::Value>,
            },
        );
        self
    }

    /// Value of option `O`, if set
    pub fn get<O: DatastoreOption>(&self) -> Option<&O::Value> {
        self.values
            .get(&TypeId::of::<O>())
            .and_then(|entry| entry.value.downcast_ref::<O::Value>())
    }

    /// Whether no option is set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for OptionsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Entry<'a>(&'a OptionValue);

        impl fmt::Debug for Entry<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                (self.0.debug)(self.0.value.as_ref(), f)
            }
        }

        let mut map = f.debug_map();
        for entry in self.values.values() {
            map.entry(&entry.name, &Entry(entry));
        }
        map.finish()
    }
}
