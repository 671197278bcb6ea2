//! Guarded with `#[cfg(test)]` from `lib.rs`

use std::collections::BTreeSet;

use anyhow::Result;
use maplit::btreeset;

use infra::persistence::Storage;

use crate::pantry::{AddIngredient, ClearPantry, ListPantry, RemoveIngredient, UserId};
use crate::recipes::{SeedCatalog, ShowCatalog};
use crate::services::{Commandable, Queryable};
use crate::suggestions::{Kitchen, SuggestRecipes};
use crate::Larder;


fn makeable<M, D>(kitchen: &Kitchen<M>) -> Result<BTreeSet<String>>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: Storage + Send + 'static,
{
    Ok(kitchen
        .query(SuggestRecipes)?
        .iter()
        .filter(|m| m.can_make)
        .map(|m| m.recipe.name.clone())
        .collect())
}

fn breakfast_workflow<M, D>(larder: &Larder<M>) -> Result<()>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: Storage + Send + 'static,
{
    larder.setup()?;
    let catalog = larder.catalog();
    let seeded = catalog.execute(SeedCatalog)?;
    assert_eq!(catalog.query(ShowCatalog)?.len(), seeded.len());

    let me = UserId::new("breakfast");
    let pantry = larder.pantry(&me);
    let kitchen = larder.kitchen(&me);
    assert_eq!(makeable(&kitchen)?, btreeset! {});

    for raw in &["Eggs", "butter", " salt", "PEPPER"] {
        pantry.execute(AddIngredient(raw.to_string()))?;
    }
    assert_eq!(
        makeable(&kitchen)?,
        btreeset! {"Classic Scrambled Eggs".to_string()}
    );

    pantry.execute(AddIngredient("cheese".into()))?;
    assert_eq!(
        makeable(&kitchen)?,
        btreeset! {
            "Classic Scrambled Eggs".to_string(),
            "Cheesy Omelet".to_string(),
        }
    );

    pantry.execute(RemoveIngredient("Salt".into()))?;
    assert!(!pantry.query(ListPantry)?.iter().any(|i| i.as_str() == "salt"));
    assert_eq!(makeable(&kitchen)?, btreeset! {});

    pantry.execute(ClearPantry)?;
    assert!(pantry.query(ListPantry)?.is_empty());
    let ranked = kitchen.query(SuggestRecipes)?;
    assert_eq!(ranked.len(), seeded.len());
    assert!(ranked.iter().all(|m| m.match_percentage == 0.0));

    Ok(())
}

#[test]
fn breakfast_workflow_in_memory() -> Result<()> {
    env_logger::try_init().unwrap_or_default();
    let (_, pool) = junk_drawer::memory_pool();
    breakfast_workflow(&Larder::from_pool(pool))
}

#[test]
#[ignore = "needs $POSTGRES_URL"]
fn breakfast_workflow_in_postgres() -> Result<()> {
    env_logger::try_init().unwrap_or_default();
    let pool = junk_drawer::pool("breakfast_workflow_in_postgres")?;
    breakfast_workflow(&Larder::from_pool(pool))
}

#[test]
fn wipe_forgets_everything() -> Result<()> {
    env_logger::try_init().unwrap_or_default();
    let (store, pool) = junk_drawer::memory_pool();
    let larder = Larder::from_pool(pool);
    larder.catalog().seed()?;
    larder.pantry(&UserId::anonymous()).add("eggs")?;

    larder.wipe()?;

    assert!(store.is_empty());
    assert!(larder.catalog().list()?.is_empty());
    assert!(larder.pantry(&UserId::anonymous()).list()?.is_empty());
    Ok(())
}
