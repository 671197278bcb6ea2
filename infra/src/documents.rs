use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::ids::{Entity, Id};

/// Opaque revision marker assigned by storage on every successful save.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash)]
pub struct Version(String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "T: Entity")]
pub struct DocMeta<T> {
    #[serde(rename = "_id")]
    pub id: Id<T>,
    #[serde(rename = "_version", default)]
    pub version: Version,
    #[serde(skip)]
    pub _phantom: PhantomData<T>,
}

pub trait HasMeta: Entity + Sized {
    fn meta(&self) -> &DocMeta<Self>;
    fn meta_mut(&mut self) -> &mut DocMeta<Self>;
}

impl Version {
    pub fn new<S: Into<String>>(version: S) -> Self {
        Version(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unsaved(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.is_unsaved() {
            write!(fmt, "unsaved")
        } else {
            write!(fmt, "{}", self.0)
        }
    }
}

impl<T> Default for DocMeta<T> {
    fn default() -> Self {
        let id = Default::default();
        let version = Default::default();
        let _phantom = Default::default();
        DocMeta {
            id,
            version,
            _phantom,
        }
    }
}

impl<T> DocMeta<T> {
    pub fn new_with_id(id: Id<T>) -> Self {
        DocMeta {
            id,
            ..Default::default()
        }
    }
}
