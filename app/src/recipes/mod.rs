use anyhow::Result;

use infra::ids::Id;
use infra::persistence::Storage;

use crate::services::{Commandable, Queryable, Request};

mod models;
mod resources;

pub use self::models::{Difficulty, Recipe, RecipeDraft, RecipePatch};
pub use self::resources::{parse_recipes, seed_recipes, CatalogSnapshot, RecipeCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowRecipe(pub Id<Recipe>);

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRecipe(pub RecipeDraft);

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecipe {
    pub id: Id<Recipe>,
    pub patch: RecipePatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRecipe(pub Id<Recipe>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedCatalog;

impl Request for ShowCatalog {
    type Resp = Vec<Recipe>;
}

impl Request for ShowRecipe {
    type Resp = Recipe;
}

impl Request for CreateRecipe {
    type Resp = Recipe;
}

impl Request for UpdateRecipe {
    type Resp = Recipe;
}

impl Request for DeleteRecipe {
    type Resp = ();
}

impl Request for SeedCatalog {
    type Resp = Vec<Recipe>;
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Queryable<ShowCatalog>
    for RecipeCatalog<M>
{
    fn query(&self, _: ShowCatalog) -> Result<Vec<Recipe>> {
        Ok(self.list()?)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Queryable<ShowRecipe>
    for RecipeCatalog<M>
{
    fn query(&self, ShowRecipe(id): ShowRecipe) -> Result<Recipe> {
        Ok(self.get(id)?)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<CreateRecipe> for RecipeCatalog<M>
{
    fn execute(&self, CreateRecipe(draft): CreateRecipe) -> Result<Recipe> {
        Ok(self.insert(draft)?)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdateRecipe> for RecipeCatalog<M>
{
    fn execute(&self, UpdateRecipe { id, patch }: UpdateRecipe) -> Result<Recipe> {
        Ok(self.update(id, patch)?)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<DeleteRecipe> for RecipeCatalog<M>
{
    fn execute(&self, DeleteRecipe(id): DeleteRecipe) -> Result<()> {
        Ok(self.delete(id)?)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<SeedCatalog> for RecipeCatalog<M>
{
    fn execute(&self, _: SeedCatalog) -> Result<Vec<Recipe>> {
        Ok(self.seed()?)
    }
}
