use std::sync::Arc;

use anyhow::Context;
use log::*;
use r2d2::Pool;

use infra::ids::IdGen;
use infra::persistence::{DocumentConnectionManager, Storage};

pub mod config;
mod error;
pub mod ingredients;
pub mod matcher;
pub mod pantry;
pub mod recipes;
pub mod services;
pub mod suggestions;
#[cfg(test)]
mod test;

pub use crate::config::Config;
pub use crate::error::{Error, ErrorKind};

use crate::pantry::{PantryStore, UserId};
use crate::recipes::RecipeCatalog;
use crate::suggestions::Kitchen;

#[derive(Debug)]
pub struct Larder<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: Arc<IdGen>,
}

impl Larder<DocumentConnectionManager> {
    pub fn new(config: &config::Config) -> anyhow::Result<Self> {
        let db = config.postgres.build()?;
        Ok(Larder::from_pool(db))
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Larder<M> {
    pub fn from_pool(db: Pool<M>) -> Self {
        let idgen = Arc::new(IdGen::new());
        Larder { db, idgen }
    }

    pub fn setup(&self) -> Result<(), Error> {
        debug!("Init schema");
        self.db.get()?.setup().context("Setup persistence")?;
        Ok(())
    }

    pub fn pantry(&self, owner: &UserId) -> PantryStore<M> {
        PantryStore::new(self.db.clone(), owner.clone())
    }

    pub fn catalog(&self) -> RecipeCatalog<M> {
        RecipeCatalog::new(self.db.clone(), self.idgen.clone())
    }

    pub fn kitchen(&self, owner: &UserId) -> Kitchen<M> {
        Kitchen::new(self.pantry(owner), self.catalog())
    }

    pub fn wipe(&self) -> Result<(), Error> {
        warn!("Wiping all documents");
        self.db.get()?.clear().context("Wipe documents")?;
        Ok(())
    }
}

impl<M: r2d2::ManageConnection> Clone for Larder<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let idgen = self.idgen.clone();
        Larder { db, idgen }
    }
}
