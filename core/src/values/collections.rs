use std::sync::{Arc, Mutex};

use hashbrown::HashMap;

use super::{Value, lock};
use crate::eval::EvalError;
use crate::types::Type;

/// Growable list backing `Std.Collections.List<T>`.
#[derive(Debug, Clone)]
pub struct ListRef {
    pub ty: Type,
    pub items: Arc<Mutex<Vec<Value>>>,
}

impl ListRef {
    pub fn new(ty: Type, items: Vec<Value>) -> Self {
        Self {
            ty,
            items: Arc::new(Mutex::new(items)),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, value: Value) {
        lock(&self.items).push(value);
    }

    fn position(&self, index: i64) -> Result<usize, EvalError> {
        let len = self.len();
        usize::try_from(index)
            .ok()
            .filter(|i| *i < len)
            .ok_or(EvalError::IndexOutOfRange { index, len })
    }

    pub fn get(&self, index: i64) -> Result<Value, EvalError> {
        let i = self.position(index)?;
        Ok(lock(&self.items)[i].clone())
    }

    pub fn set(&self, index: i64, value: Value) -> Result<(), EvalError> {
        let i = self.position(index)?;
        lock(&self.items)[i] = value;
        Ok(())
    }

    pub fn update<R>(
        &self,
        index: i64,
        f: impl FnOnce(&mut Value) -> Result<R, EvalError>,
    ) -> Result<R, EvalError> {
        let i = self.position(index)?;
        let mut items = lock(&self.items);
        f(&mut items[i])
    }
}

/// Hashable projection of a map key. Reference types hash by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Arc<str>),
    Struct(Vec<MapKey>),
    Ref(usize),
}

impl From<&Value> for MapKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => MapKey::Null,
            Value::Bool(b) => MapKey::Bool(*b),
            Value::Int(i) => MapKey::Int(*i),
            Value::Float(f) => MapKey::Float(f.to_bits()),
            Value::Str(s) => MapKey::Str(s.clone()),
            Value::Struct(s) => MapKey::Struct(s.fields.iter().map(MapKey::from).collect()),
            Value::Array(a) => MapKey::Ref(Arc::as_ptr(&a.items) as usize),
            Value::Object(o) => MapKey::Ref(Arc::as_ptr(&o.fields) as usize),
            Value::List(l) => MapKey::Ref(Arc::as_ptr(&l.items) as usize),
            Value::Map(m) => MapKey::Ref(Arc::as_ptr(&m.entries) as usize),
        }
    }
}

/// Insertion-ordered entries of a map.
#[derive(Debug, Default)]
pub struct MapEntries {
    index: HashMap<MapKey, usize>,
    pairs: Vec<(Value, Value)>,
}

impl MapEntries {
    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.pairs.iter()
    }
}

/// Dictionary backing `Std.Collections.Map<K, V>`.
#[derive(Debug, Clone)]
pub struct MapRef {
    pub ty: Type,
    pub entries: Arc<Mutex<MapEntries>>,
}

impl MapRef {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            entries: Arc::new(Mutex::new(MapEntries::default())),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        lock(&self.entries).index.contains_key(&MapKey::from(key))
    }

    pub fn get(&self, key: &Value) -> Result<Value, EvalError> {
        let entries = lock(&self.entries);
        entries
            .index
            .get(&MapKey::from(key))
            .map(|&i| entries.pairs[i].1.clone())
            .ok_or_else(|| EvalError::KeyNotFound(key.to_string()))
    }

    /// Adds a new entry; fails if the key is already present.
    pub fn add(&self, key: Value, value: Value) -> Result<(), EvalError> {
        let mut entries = lock(&self.entries);
        let map_key = MapKey::from(&key);
        if entries.index.contains_key(&map_key) {
            return Err(EvalError::Native(format!(
                "an entry with key {} already exists",
                key
            )));
        }
        let slot = entries.pairs.len();
        entries.pairs.push((key, value));
        entries.index.insert(map_key, slot);
        Ok(())
    }

    /// Inserts or replaces the entry for `key`.
    pub fn set(&self, key: Value, value: Value) {
        let mut entries = lock(&self.entries);
        let map_key = MapKey::from(&key);
        match entries.index.get(&map_key).copied() {
            Some(i) => entries.pairs[i].1 = value,
            None => {
                let slot = entries.pairs.len();
                entries.pairs.push((key, value));
                entries.index.insert(map_key, slot);
            }
        }
    }

    pub fn update<R>(
        &self,
        key: &Value,
        f: impl FnOnce(&mut Value) -> Result<R, EvalError>,
    ) -> Result<R, EvalError> {
        let mut entries = lock(&self.entries);
        let i = entries
            .index
            .get(&MapKey::from(key))
            .copied()
            .ok_or_else(|| EvalError::KeyNotFound(key.to_string()))?;
        f(&mut entries.pairs[i].1)
    }
}
