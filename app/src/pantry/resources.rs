use chrono::Utc;
use log::*;
use r2d2::Pool;

use infra::persistence::{is_conflict, ConcurrencyError, Storage};

use super::models::{Pantry, UserId};
use crate::error::Error;
use crate::ingredients::Ingredient;

const MAX_ATTEMPTS: usize = 5;

#[derive(Debug)]
pub struct PantryStore<M: r2d2::ManageConnection> {
    db: Pool<M>,
    owner: UserId,
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> PantryStore<M> {
    pub fn new(db: Pool<M>, owner: UserId) -> Self {
        PantryStore { db, owner }
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn add(&self, raw: &str) -> Result<Ingredient, Error> {
        let ingredient = Ingredient::parse(raw)?;
        self.modify(|pantry| {
            pantry.add(ingredient.clone(), Utc::now())?;
            Ok(true)
        })?;
        info!("Added {} to pantry of {}", ingredient, self.owner);
        Ok(ingredient)
    }

    pub fn remove(&self, ingredient: &str) -> Result<bool, Error> {
        let ingredient = match Ingredient::parse(ingredient) {
            Ok(ingredient) => ingredient,
            // Nothing blank is ever stored, so there is nothing to remove.
            Err(Error::EmptyIngredient) => return Ok(false),
            Err(e) => return Err(e),
        };
        let removed = self.modify(|pantry| Ok(pantry.remove(&ingredient)))?;
        if removed {
            info!("Removed {} from pantry of {}", ingredient, self.owner);
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<bool, Error> {
        let cleared = self.modify(|pantry| Ok(pantry.clear()))?;
        if cleared {
            info!("Cleared pantry of {}", self.owner);
        }
        Ok(cleared)
    }

    pub fn list(&self) -> Result<Vec<Ingredient>, Error> {
        Ok(self.load()?.ingredients().cloned().collect())
    }

    pub fn load(&self) -> Result<Pantry, Error> {
        let docs = self.db.get()?;
        self.load_from(&*docs)
    }

    fn load_from(&self, docs: &D) -> Result<Pantry, Error> {
        let pantry = docs
            .load(&Pantry::id(&self.owner))?
            .unwrap_or_else(|| Pantry::new(self.owner.clone()));
        trace!(
            "Pantry of {} at {} holds {} items",
            self.owner,
            pantry.meta.version,
            pantry.len()
        );
        Ok(pantry)
    }

    /// `f` reports whether it changed the pantry. Returns whether anything
    /// was written.
    fn modify<F: FnMut(&mut Pantry) -> Result<bool, Error>>(&self, mut f: F) -> Result<bool, Error> {
        let docs = self.db.get()?;
        for attempt in 1..=MAX_ATTEMPTS {
            let mut pantry = self.load_from(&*docs)?;
            if !f(&mut pantry)? {
                debug!("Pantry of {} unchanged", self.owner);
                return Ok(false);
            }
            match docs.save(&mut pantry) {
                Ok(()) => {
                    debug!("Saved pantry of {} at {}", self.owner, pantry.meta.version);
                    return Ok(true);
                }
                Err(e) if is_conflict(&e) => {
                    warn!(
                        "Conflict saving pantry of {} (attempt {})",
                        self.owner, attempt
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Persistence(
            anyhow::Error::new(ConcurrencyError)
                .context(format!("pantry of {} kept changing", self.owner)),
        ))
    }
}

impl<M: r2d2::ManageConnection> Clone for PantryStore<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let owner = self.owner.clone();
        PantryStore { db, owner }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test::junk_drawer;
    use infra::memory::{MemoryConnectionManager, MemoryStore};

    fn store(user: &str) -> (MemoryStore, PantryStore<MemoryConnectionManager>) {
        let (mem, pool) = junk_drawer::memory_pool();
        (mem, PantryStore::new(pool, UserId::new(user)))
    }

    fn names(store: &PantryStore<MemoryConnectionManager>) -> Vec<String> {
        store
            .list()
            .expect("list")
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn add_returns_the_canonical_entry() {
        let (_, pantry) = store("alice");
        let added = pantry.add("  Tomato ").expect("add");

        assert_eq!(added.as_str(), "tomato");
        assert_eq!(names(&pantry), vec!["tomato"]);
    }

    #[test]
    fn normalized_duplicates_collide() {
        let (_, pantry) = store("alice");
        pantry.add("  Tomato ").expect("add");

        let err = pantry.add("tomato").expect_err("duplicate");

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(
            matches!(err, Error::DuplicateIngredient(_)),
            "{:?}",
            err
        );
        assert_eq!(names(&pantry), vec!["tomato"]);
    }

    #[test]
    fn blank_input_is_a_validation_failure() {
        let (mem, pantry) = store("alice");
        let err = pantry.add("   ").expect_err("blank");

        assert!(matches!(err, Error::EmptyIngredient), "{:?}", err);
        assert!(mem.is_empty(), "nothing should have been written");
    }

    #[test]
    fn list_reflects_each_mutation_immediately() {
        let (_, pantry) = store("alice");
        pantry.add("eggs").expect("add");
        pantry.add("butter").expect("add");
        assert_eq!(names(&pantry), vec!["butter", "eggs"]);

        pantry.remove("eggs").expect("remove");
        assert_eq!(names(&pantry), vec!["butter"]);

        pantry.clear().expect("clear");
        assert!(names(&pantry).is_empty());
    }

    #[test]
    fn removing_an_absent_ingredient_is_a_no_op() {
        let (_, pantry) = store("alice");
        pantry.add("eggs").expect("add");
        let before = pantry.load().expect("load").meta.version;

        assert!(!pantry.remove("milk").expect("remove"));
        assert!(!pantry.remove("").expect("remove blank"));

        assert_eq!(names(&pantry), vec!["eggs"]);
        assert_eq!(pantry.load().expect("load").meta.version, before);
    }

    #[test]
    fn remove_matches_by_canonical_form() {
        let (_, pantry) = store("alice");
        pantry.add("olive oil").expect("add");

        assert!(pantry.remove(" Olive Oil").expect("remove"));

        assert!(names(&pantry).is_empty());
    }

    #[test]
    fn pantries_are_per_user() {
        let (_, pool) = junk_drawer::memory_pool();
        let alice = PantryStore::new(pool.clone(), UserId::new("alice"));
        let bob = PantryStore::new(pool, UserId::new("bob"));

        alice.add("eggs").expect("add");
        bob.add("eggs").expect("bob may own eggs too");
        bob.clear().expect("clear");

        assert_eq!(names(&alice), vec!["eggs"]);
        assert!(names(&bob).is_empty());
    }

    #[test]
    fn clearing_a_pantry_that_never_existed_writes_nothing() {
        let (mem, pantry) = store("nobody");
        assert!(!pantry.clear().expect("clear"));
        assert!(mem.is_empty());
    }

    #[test]
    fn clearing_reports_only_real_changes() {
        let (_, pantry) = store("alice");
        pantry.add("eggs").expect("add");

        assert!(pantry.clear().expect("clear"));
        let emptied = pantry.load().expect("load").meta.version;
        assert!(!pantry.clear().expect("clear again"));

        assert_eq!(pantry.load().expect("load").meta.version, emptied);
    }

    #[test]
    fn storage_failures_are_persistence_failures() {
        let (mem, pantry) = store("alice");
        mem.set_faulty(true);

        for err in vec![
            pantry.add("eggs").expect_err("add"),
            pantry.remove("eggs").expect_err("remove"),
            pantry.clear().expect_err("clear"),
        ] {
            assert_eq!(err.kind(), ErrorKind::Persistence, "{:?}", err);
        }
        assert!(pantry.list().is_err());
    }
}
