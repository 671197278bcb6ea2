use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use err_derive::Error;
use log::*;
use serde::{de::DeserializeOwned, Serialize};

use crate::documents::{HasMeta, Version};
use crate::ids::{Entity, Id};
use crate::persistence::{ConcurrencyError, Storage};

#[derive(Debug, Error)]
#[error(display = "memory store unavailable")]
pub struct Unavailable;

#[derive(Debug, Default)]
struct State {
    docs: BTreeMap<String, serde_json::Value>,
    next_version: u64,
    faulty: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore(Arc<Mutex<State>>);

#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionManager {
    store: MemoryStore,
}

#[derive(Debug)]
pub struct MemoryDocuments {
    store: MemoryStore,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every storage operation fails with [`Unavailable`].
    pub fn set_faulty(&self, faulty: bool) {
        self.state_unchecked().faulty = faulty;
    }

    pub fn len(&self) -> usize {
        self.state_unchecked().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state_unchecked(&self) -> MutexGuard<'_, State> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.state_unchecked();
        if state.faulty {
            return Err(Unavailable.into());
        }
        Ok(state)
    }
}

impl MemoryConnectionManager {
    pub fn new(store: MemoryStore) -> Self {
        MemoryConnectionManager { store }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl r2d2::ManageConnection for MemoryConnectionManager {
    type Connection = MemoryDocuments;
    type Error = Unavailable;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let store = self.store.clone();
        Ok(MemoryDocuments { store })
    }

    fn is_valid(&self, _: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}

impl Storage for MemoryDocuments {
    fn setup(&self) -> Result<()> {
        self.store.state()?;
        Ok(())
    }

    fn load<D: DeserializeOwned + Entity>(&self, id: &Id<D>) -> Result<Option<D>> {
        let state = self.store.state()?;
        match state.docs.get(&id.to_string()) {
            Some(body) => {
                let doc = serde_json::from_value(body.clone())
                    .with_context(|| format!("decode {}", id))?;
                debug!("Loaded {}", id);
                Ok(Some(doc))
            }
            None => {
                debug!("No document at {}", id);
                Ok(None)
            }
        }
    }

    fn save<D: Serialize + HasMeta>(&self, document: &mut D) -> Result<()> {
        let mut body = serde_json::to_value(&*document)?;
        let key = document.meta().id.to_string();
        let mut state = self.store.state()?;

        let current = state
            .docs
            .get(&key)
            .and_then(|b| b.get("_version"))
            .and_then(|v| v.as_str())
            .map(Version::new);
        let expected = &document.meta().version;
        let fresh = match current {
            None => expected.is_unsaved(),
            Some(ref v) => v == expected,
        };
        if !fresh {
            warn!("Stale save of {}: expected {:?}", key, expected);
            return Err(ConcurrencyError.into());
        }

        state.next_version += 1;
        let version = Version::new(format!("{:x}", state.next_version));
        body.as_object_mut()
            .ok_or_else(|| anyhow!("document {} is not an object", key))?
            .insert("_version".into(), version.as_str().into());
        debug!("Save {} at {}", key, version);
        state.docs.insert(key, body);
        document.meta_mut().version = version;
        Ok(())
    }

    fn delete<D: HasMeta>(&self, document: &D) -> Result<()> {
        let meta = document.meta();
        let key = meta.id.to_string();
        let mut state = self.store.state()?;
        let matches = state
            .docs
            .get(&key)
            .and_then(|b| b.get("_version"))
            .and_then(|v| v.as_str())
            .map_or(false, |v| v == meta.version.as_str());
        if !matches {
            return Err(ConcurrencyError.into());
        }
        state.docs.remove(&key);
        debug!("Deleted {}", key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.store.state()?;
        info!("Cleared {} documents", state.docs.len());
        state.docs.clear();
        Ok(())
    }
}
