use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use log::*;

use infra::documents::Version;
use infra::persistence::Storage;

use crate::error::Error;
use crate::ingredients::IngredientSet;
use crate::matcher::{rank, MatchResult};
use crate::pantry::PantryStore;
use crate::recipes::{CatalogSnapshot, RecipeCatalog};
use crate::services::{Queryable, Request};

const MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Fresh(Arc<Vec<MatchResult>>),
    Superseded,
}

type SnapshotKey = (u64, Version);

#[derive(Debug, Default)]
pub struct Recommender {
    issued: u64,
    cached: Option<(SnapshotKey, Arc<Vec<MatchResult>>)>,
    runs: u64,
}

impl Recommender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call before fetching the snapshot that will be settled.
    pub fn begin(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    pub fn settle(
        &mut self,
        ticket: Ticket,
        pantry: &IngredientSet,
        catalog: &CatalogSnapshot,
    ) -> Settled {
        if ticket.0 != self.issued {
            warn!(
                "Dropping snapshot for {:?}; latest is {:?}",
                ticket,
                Ticket(self.issued)
            );
            return Settled::Superseded;
        }

        let key = (pantry.fingerprint(), catalog.version.clone());
        if let Some((cached, results)) = self.cached.as_ref() {
            if *cached == key {
                trace!("Reusing ranking for catalog {}", catalog.version);
                return Settled::Fresh(results.clone());
            }
        }

        let results = Arc::new(rank(pantry, &catalog.recipes));
        self.runs += 1;
        debug!(
            "Ranked {} recipes against {} ingredients at catalog {}",
            results.len(),
            pantry.len(),
            catalog.version
        );
        self.cached = Some((key, results.clone()));
        Settled::Fresh(results)
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }
}

#[derive(Debug)]
pub struct Kitchen<M: r2d2::ManageConnection> {
    pantry: PantryStore<M>,
    catalog: RecipeCatalog<M>,
    recommender: Arc<Mutex<Recommender>>,
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Kitchen<M> {
    pub fn new(pantry: PantryStore<M>, catalog: RecipeCatalog<M>) -> Self {
        let recommender = Arc::new(Mutex::new(Recommender::new()));
        Kitchen {
            pantry,
            catalog,
            recommender,
        }
    }

    pub fn pantry(&self) -> &PantryStore<M> {
        &self.pantry
    }

    pub fn catalog(&self) -> &RecipeCatalog<M> {
        &self.catalog
    }

    pub fn suggest(&self) -> Result<Arc<Vec<MatchResult>>, Error> {
        let mut attempt = 1;
        loop {
            let ticket = self.recommender().begin();
            let pantry = self.pantry.load()?.to_set();
            let catalog = self.catalog.snapshot()?;
            match self.recommender().settle(ticket, &pantry, &catalog) {
                Settled::Fresh(results) => return Ok(results),
                Settled::Superseded if attempt < MAX_ATTEMPTS => {
                    debug!("Suggestion fetch superseded (attempt {})", attempt);
                    attempt += 1;
                }
                // Still a consistent snapshot; it just never becomes the cached one.
                Settled::Superseded => {
                    debug!("Ranking superseded snapshot at {} uncached", catalog.version);
                    return Ok(Arc::new(rank(&pantry, &catalog.recipes)));
                }
            }
        }
    }

    pub fn runs(&self) -> u64 {
        self.recommender().runs()
    }

    fn recommender(&self) -> MutexGuard<Recommender> {
        self.recommender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<M: r2d2::ManageConnection> Clone for Kitchen<M> {
    fn clone(&self) -> Self {
        let pantry = self.pantry.clone();
        let catalog = self.catalog.clone();
        let recommender = self.recommender.clone();
        Kitchen {
            pantry,
            catalog,
            recommender,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestRecipes;

impl Request for SuggestRecipes {
    type Resp = Arc<Vec<MatchResult>>;
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<SuggestRecipes> for Kitchen<M>
{
    fn query(&self, _: SuggestRecipes) -> Result<Arc<Vec<MatchResult>>> {
        Ok(self.suggest()?)
    }
}
