use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use fallible_iterator::FallibleIterator;
use log::*;
use r2d2::Pool;
use serde::Deserialize;

use infra::documents::Version;
use infra::ids::{Id, IdGen};
use infra::persistence::{is_conflict, ConcurrencyError, Storage};

use super::models::{Recipe, RecipeDraft, RecipeIndex, RecipePatch};
use crate::error::Error;

const MAX_ATTEMPTS: usize = 5;
const SEED_TOML: &str = include_str!("seed.toml");

#[derive(Debug)]
pub struct RecipeCatalog<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: Arc<IdGen>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    pub version: Version,
    pub recipes: Vec<Recipe>,
}

#[derive(Deserialize)]
struct RecipeFile {
    #[serde(default)]
    recipe: Vec<RecipeDraft>,
}

pub fn parse_recipes(text: &str) -> Result<Vec<RecipeDraft>, Error> {
    let file: RecipeFile =
        toml::from_str(text).map_err(|e| Error::InvalidRecipe(e.to_string()))?;
    Ok(file.recipe)
}

pub fn seed_recipes() -> Result<Vec<RecipeDraft>, Error> {
    parse_recipes(SEED_TOML)
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> RecipeCatalog<M> {
    pub fn new(db: Pool<M>, idgen: Arc<IdGen>) -> Self {
        RecipeCatalog { db, idgen }
    }

    pub fn list(&self) -> Result<Vec<Recipe>, Error> {
        Ok(self.snapshot()?.recipes)
    }

    pub fn snapshot(&self) -> Result<CatalogSnapshot, Error> {
        let docs = self.db.get()?;
        let index = load_index(&*docs)?;
        let loaded: Vec<Option<Recipe>> =
            fallible_iterator::convert(index.newest_first().map(|id| docs.load::<Recipe>(id)))
                .collect()?;

        let recipes = index
            .newest_first()
            .zip(loaded)
            .filter_map(|(id, recipe)| {
                if recipe.is_none() {
                    warn!("Index refers to missing recipe {}", id);
                }
                recipe
            })
            .collect::<Vec<_>>();
        trace!(
            "Catalog at {} has {} recipes",
            index.meta.version,
            recipes.len()
        );

        Ok(CatalogSnapshot {
            version: index.meta.version,
            recipes,
        })
    }

    pub fn version(&self) -> Result<Version, Error> {
        let docs = self.db.get()?;
        Ok(load_index(&*docs)?.meta.version)
    }

    pub fn get(&self, id: Id<Recipe>) -> Result<Recipe, Error> {
        let docs = self.db.get()?;
        let recipe = docs.load(&id)?;
        debug!("Load {} -> {:?}", id, recipe.as_ref().map(|r| &r.name));
        recipe.ok_or_else(|| not_found(id))
    }

    pub fn insert(&self, draft: RecipeDraft) -> Result<Recipe, Error> {
        let draft = draft.validate()?;
        let docs = self.db.get()?;
        let mut recipe = Recipe::from_draft(self.idgen.generate(), draft, Utc::now());
        docs.save(&mut recipe)?;

        let id = recipe.id();
        let version = modify_index(&*docs, |index| index.recipes.push(id))?;
        info!("Added recipe {} ({}); catalog now {}", id, recipe.name, version);
        Ok(recipe)
    }

    pub fn update(&self, id: Id<Recipe>, patch: RecipePatch) -> Result<Recipe, Error> {
        let docs = self.db.get()?;
        for attempt in 1..=MAX_ATTEMPTS {
            let mut recipe: Recipe = docs.load(&id)?.ok_or_else(|| not_found(id))?;
            recipe.apply(patch.clone(), Utc::now())?;
            match docs.save(&mut recipe) {
                Ok(()) => {
                    let version = modify_index(&*docs, |_| ())?;
                    info!("Updated recipe {}; catalog now {}", id, version);
                    return Ok(recipe);
                }
                Err(e) if is_conflict(&e) => {
                    warn!("Conflict updating {} (attempt {})", id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(contended(format!("recipe {}", id)))
    }

    pub fn delete(&self, id: Id<Recipe>) -> Result<(), Error> {
        let docs = self.db.get()?;
        remove_recipe(&*docs, id)
    }

    pub fn seed(&self) -> Result<Vec<Recipe>, Error> {
        let existing = self
            .list()?
            .into_iter()
            .map(|r| r.name)
            .collect::<HashSet<_>>();

        let mut added = Vec::new();
        for draft in seed_recipes()? {
            if existing.contains(&draft.name) {
                debug!("Already have {:?}", draft.name);
                continue;
            }
            added.push(self.insert(draft)?);
        }
        info!("Seeded {} recipes", added.len());
        Ok(added)
    }
}

impl<M: r2d2::ManageConnection> Clone for RecipeCatalog<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let idgen = self.idgen.clone();
        RecipeCatalog { db, idgen }
    }
}

fn load_index<D: Storage>(docs: &D) -> Result<RecipeIndex, Error> {
    Ok(docs
        .load(&RecipeIndex::id())?
        .unwrap_or_else(RecipeIndex::new))
}

fn modify_index<D: Storage, F: FnMut(&mut RecipeIndex)>(
    docs: &D,
    mut f: F,
) -> Result<Version, Error> {
    for attempt in 1..=MAX_ATTEMPTS {
        let mut index = load_index(docs)?;
        f(&mut index);
        index.touch();
        match docs.save(&mut index) {
            Ok(()) => return Ok(index.meta.version),
            Err(e) if is_conflict(&e) => {
                warn!("Conflict saving recipe index (attempt {})", attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(contended("recipe index".into()))
}

fn remove_recipe<D: Storage>(docs: &D, id: Id<Recipe>) -> Result<(), Error> {
    if docs.load::<Recipe>(&id)?.is_none() {
        return Err(not_found(id));
    }
    // Unlink first; a leftover document nobody indexes is harmless.
    let version = modify_index(docs, |index| index.recipes.retain(|r| *r != id))?;
    for attempt in 1..=MAX_ATTEMPTS {
        let recipe = match docs.load::<Recipe>(&id)? {
            Some(recipe) => recipe,
            None => break,
        };
        match docs.delete(&recipe) {
            Ok(()) => break,
            Err(e) if is_conflict(&e) => {
                warn!("Conflict deleting {} (attempt {})", id, attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!("Deleted recipe {}; catalog now {}", id, version);
    Ok(())
}

fn not_found(id: Id<Recipe>) -> Error {
    Error::RecipeNotFound(id.to_string())
}

fn contended(what: String) -> Error {
    Error::Persistence(anyhow::Error::new(ConcurrencyError).context(format!("{} kept changing", what)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recipes::Difficulty;
    use crate::test::junk_drawer;
    use infra::documents::HasMeta;
    use infra::ids::Entity;
    use infra::memory::MemoryDocuments;
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use std::cell::RefCell;

    fn catalog() -> (infra::memory::MemoryStore, RecipeCatalog<infra::memory::MemoryConnectionManager>) {
        let (store, pool) = junk_drawer::memory_pool();
        (store, RecipeCatalog::new(pool, Arc::new(IdGen::new())))
    }

    fn draft(name: &str, ingredients: &[&str]) -> RecipeDraft {
        RecipeDraft {
            name: name.into(),
            description: String::new(),
            ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
            instructions: vec![],
            cooking_time: "10 minutes".into(),
            difficulty: Difficulty::Easy,
            tags: vec![],
        }
    }

    #[test]
    fn empty_catalog_lists_nothing() {
        let (_, catalog) = catalog();
        assert_eq!(catalog.list().expect("list"), vec![]);
    }

    #[test]
    fn lists_newest_first() {
        let (_, catalog) = catalog();
        catalog.insert(draft("first", &["a"])).expect("insert");
        catalog.insert(draft("second", &["b"])).expect("insert");

        let names = catalog
            .list()
            .expect("list")
            .into_iter()
            .map(|r| r.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn get_returns_inserted_recipe() {
        let (_, catalog) = catalog();
        let recipe = catalog.insert(draft("toast", &["bread"])).expect("insert");

        assert_eq!(catalog.get(recipe.id()).expect("get"), recipe);
    }

    #[test]
    fn missing_ids_are_not_found() {
        let (_, catalog) = catalog();
        let id = IdGen::new().generate();

        for err in vec![
            catalog.get(id).expect_err("get"),
            catalog.update(id, RecipePatch::default()).expect_err("update"),
            catalog.delete(id).expect_err("delete"),
        ] {
            assert_eq!(err.kind(), ErrorKind::NotFound, "{:?}", err);
        }
    }

    #[test]
    fn every_change_moves_the_catalog_version() {
        let (_, catalog) = catalog();
        let v0 = catalog.version().expect("version");
        let recipe = catalog.insert(draft("toast", &["bread"])).expect("insert");
        let v1 = catalog.version().expect("version");
        let patch = RecipePatch {
            ingredients: Some(vec!["bread".into(), "butter".into()]),
            ..Default::default()
        };
        let updated = catalog.update(recipe.id(), patch).expect("update");
        let v2 = catalog.version().expect("version");
        catalog.delete(recipe.id()).expect("delete");
        let v3 = catalog.version().expect("version");

        assert_eq!(updated.ingredients, vec!["bread", "butter"]);
        assert_ne!(v0, v1);
        assert_ne!(v1, v2);
        assert_ne!(v2, v3);
        assert_eq!(catalog.list().expect("list"), vec![]);
    }

    struct UpdatedBeforeDelete<'a> {
        docs: &'a MemoryDocuments,
        update: RefCell<Option<Box<dyn FnOnce() + 'a>>>,
    }

    impl Storage for UpdatedBeforeDelete<'_> {
        fn setup(&self) -> anyhow::Result<()> {
            self.docs.setup()
        }
        fn load<T: DeserializeOwned + Entity>(&self, id: &Id<T>) -> anyhow::Result<Option<T>> {
            self.docs.load(id)
        }
        fn save<T: Serialize + HasMeta>(&self, document: &mut T) -> anyhow::Result<()> {
            self.docs.save(document)
        }
        fn delete<T: HasMeta>(&self, document: &T) -> anyhow::Result<()> {
            let update = self.update.borrow_mut().take();
            if let Some(update) = update {
                update();
            }
            self.docs.delete(document)
        }
        fn clear(&self) -> anyhow::Result<()> {
            self.docs.clear()
        }
    }

    #[test]
    fn delete_wins_over_a_concurrent_update() {
        let (store, pool) = junk_drawer::memory_pool();
        let catalog = RecipeCatalog::new(pool.clone(), Arc::new(IdGen::new()));
        let recipe = catalog.insert(draft("toast", &["bread"])).expect("insert");
        let id = recipe.id();

        let docs = pool.get().expect("connection");
        let racing = UpdatedBeforeDelete {
            docs: &*docs,
            update: RefCell::new(Some(Box::new(|| {
                let patch = RecipePatch {
                    name: Some("buttered toast".into()),
                    ..Default::default()
                };
                catalog.update(id, patch).expect("concurrent update");
            }))),
        };

        remove_recipe(&racing, id).expect("delete");

        assert!(racing.update.borrow().is_none(), "update should have run");
        assert_eq!(catalog.get(id).expect_err("get").kind(), ErrorKind::NotFound);
        assert_eq!(catalog.list().expect("list"), vec![]);
        assert_eq!(store.len(), 1, "only the index should remain");
    }

    #[test]
    fn invalid_drafts_are_not_stored() {
        let (store, catalog) = catalog();
        let err = catalog.insert(draft(" ", &["a"])).expect_err("insert");

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(store.is_empty());
    }

    #[test]
    fn seeding_twice_adds_nothing_new() {
        let (_, catalog) = catalog();
        let first = catalog.seed().expect("seed");
        let second = catalog.seed().expect("seed again");

        assert_eq!(first.len(), 6);
        assert!(second.is_empty());
        assert_eq!(catalog.list().expect("list").len(), 6);
    }

    #[test]
    fn storage_failures_surface_as_persistence() {
        let (store, catalog) = catalog();
        store.set_faulty(true);

        let err = catalog.list().expect_err("list");

        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn bundled_seed_parses() {
        let drafts = seed_recipes().expect("seed");
        assert_eq!(drafts[0].name, "Classic Scrambled Eggs");
        assert_eq!(
            drafts[0].ingredients,
            vec!["eggs", "butter", "salt", "pepper"]
        );
        assert_eq!(drafts[4].difficulty, Difficulty::Medium);
    }
}
