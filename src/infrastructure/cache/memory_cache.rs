//! In-process cache
//!
//! `Cache` implementation backed by a `DashMap`, for single-node deployments
//! and tests. Expirations are honoured lazily: an expired key is dropped the
//! next time it is touched.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::cache_service::{Cache, HashEntry};
use crate::shared::error::AppError;

#[derive(Debug)]
enum SlotValue {
    List(Vec<String>),
    Hash(HashMap<String, String>),
}

#[derive(Debug)]
struct Slot {
    value: SlotValue,
    expires_at: Instant,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

fn wrong_type(key: &str) -> AppError {
    AppError::Internal(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

/// In-memory cache with per-key expiration.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slots: DashMap<String, Slot>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.iter().filter(|slot| !slot.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` against the live hash at `key`, if any.
    fn with_hash<T>(
        &self,
        key: &str,
        f: impl FnOnce(&HashMap<String, String>) -> T,
    ) -> Result<Option<T>, AppError> {
        let now = Instant::now();
        self.slots.remove_if(key, |_, slot| slot.is_expired(now));

        match self.slots.get(key) {
            None => Ok(None),
            Some(slot) => match &slot.value {
                SlotValue::Hash(map) => Ok(Some(f(map))),
                SlotValue::List(_) => Err(wrong_type(key)),
            },
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn list_push(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        let now = Instant::now();
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.is_expired(now) {
                    slot.value = SlotValue::List(Vec::new());
                }
                match &mut slot.value {
                    SlotValue::List(items) => items.push(value),
                    SlotValue::Hash(_) => return Err(wrong_type(key)),
                }
                slot.expires_at = now + ttl;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    value: SlotValue::List(vec![value]),
                    expires_at: now + ttl,
                });
            }
        }
        Ok(())
    }

    async fn list_take_all(&self, key: &str) -> Result<Vec<String>, AppError> {
        let now = Instant::now();
        match self.slots.remove(key) {
            None => Ok(Vec::new()),
            Some((_, slot)) if slot.is_expired(now) => Ok(Vec::new()),
            Some((_, Slot { value: SlotValue::List(items), .. })) => Ok(items),
            Some((key, slot)) => {
                // Not a list: put it back untouched.
                let err = wrong_type(&key);
                self.slots.insert(key, slot);
                Err(err)
            }
        }
    }

    async fn hash_set_many(&self, entries: &[HashEntry], ttl: Duration) -> Result<(), AppError> {
        let now = Instant::now();
        for entry in entries {
            match self.slots.entry(entry.key.clone()) {
                Entry::Occupied(mut occupied) => {
                    let slot = occupied.get_mut();
                    if slot.is_expired(now) {
                        slot.value = SlotValue::Hash(HashMap::new());
                    }
                    match &mut slot.value {
                        SlotValue::Hash(map) => {
                            map.insert(entry.field.clone(), entry.value.clone());
                        }
                        SlotValue::List(_) => return Err(wrong_type(&entry.key)),
                    }
                    slot.expires_at = now + ttl;
                }
                Entry::Vacant(vacant) => {
                    let mut map = HashMap::new();
                    map.insert(entry.field.clone(), entry.value.clone());
                    vacant.insert(Slot {
                        value: SlotValue::Hash(map),
                        expires_at: now + ttl,
                    });
                }
            }
        }
        Ok(())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        self.slots.remove_if(key, |_, slot| slot.is_expired(now));

        let removed = match self.slots.get_mut(key) {
            None => return Ok(false),
            Some(mut slot) => match &mut slot.value {
                SlotValue::Hash(map) => map.remove(field).is_some(),
                SlotValue::List(_) => return Err(wrong_type(key)),
            },
        };

        // Redis drops a hash once its last field is gone.
        self.slots
            .remove_if(key, |_, slot| matches!(&slot.value, SlotValue::Hash(map) if map.is_empty()));
        Ok(removed)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .with_hash(key, |map| map.get(field).cloned())?
            .flatten())
    }

    async fn hash_fields(&self, key: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .with_hash(key, |map| map.keys().cloned().collect())?
            .unwrap_or_default())
    }

    async fn hash_contains(&self, key: &str, field: &str) -> Result<bool, AppError> {
        Ok(self
            .with_hash(key, |map| map.contains_key(field))?
            .unwrap_or(false))
    }
}
