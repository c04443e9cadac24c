//! Per-database cache of table structures.
//!
//! Structures are derived on first use and kept for the lifetime of the
//! registry. Registration additionally binds a record type to its table
//! name so queries can be issued against it.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::record::{Record, TableStructure};
use crate::schema::TableDefinition;

type AnyStructure = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Registered {
    /// table name -> definition
    tables: BTreeMap<String, TableDefinition>,
    /// record type -> table name
    names: HashMap<TypeId, String>,
}

#[derive(Default)]
pub struct SchemaRegistry {
    structures: RwLock<HashMap<TypeId, AnyStructure>>,
    registered: RwLock<Registered>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The structure of `R`, derived once and then served from the cache.
    pub fn structure_for<R: Record>(&self) -> Result<Arc<TableStructure<R>>> {
        let key = TypeId::of::<R>();
        if let Some(cached) = self.cached::<R>(key) {
            return Ok(cached);
        }

        // Derivation is deterministic, so a racing thread builds an equal
        // structure; the first insert wins.
        let derived: AnyStructure = Arc::new(TableStructure::<R>::derive()?);
        let stored = self
            .structures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(derived)
            .clone();
        Ok(downcast(stored))
    }

    /// Register `R`, returning its definition for table creation.
    pub fn register<R: Record>(&self) -> Result<TableDefinition> {
        let structure = self.structure_for::<R>()?;
        let definition = structure.definition().clone();
        let key = TypeId::of::<R>();

        let mut registered = self.registered.write().unwrap_or_else(PoisonError::into_inner);
        if registered.names.contains_key(&key) {
            return Ok(definition);
        }
        if registered.tables.contains_key(&definition.name) {
            return Err(Error::schema(
                &definition.name,
                format!(
                    "table already registered by another record type than `{}`",
                    std::any::type_name::<R>()
                ),
            ));
        }
        registered.tables.insert(definition.name.clone(), definition.clone());
        registered.names.insert(key, definition.name.clone());
        Ok(definition)
    }

    /// The structure of a registered record type.
    pub fn registered<R: Record>(&self) -> Result<Arc<TableStructure<R>>> {
        let known = self
            .registered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .contains_key(&TypeId::of::<R>());
        if !known {
            return Err(Error::schema(
                std::any::type_name::<R>(),
                "record type is not registered with this database",
            ));
        }
        self.structure_for::<R>()
    }

    pub fn table(&self, name: &str) -> Option<TableDefinition> {
        self.registered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tables
            .get(name)
            .cloned()
    }

    /// Registered table definitions, ordered by table name.
    pub fn tables(&self) -> Vec<TableDefinition> {
        self.registered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tables
            .values()
            .cloned()
            .collect()
    }

    fn cached<R: Record>(&self, key: TypeId) -> Option<Arc<TableStructure<R>>> {
        self.structures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .map(downcast)
    }
}

fn downcast<R: Record>(stored: AnyStructure) -> Arc<TableStructure<R>> {
    match stored.downcast::<TableStructure<R>>() {
        Ok(structure) => structure,
        // Entries are keyed by the TypeId of the record type they hold.
        Err(_) => unreachable!("structure cache entry has the wrong type"),
    }
}
