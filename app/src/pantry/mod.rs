use anyhow::Result;

use infra::persistence::Storage;

use crate::ingredients::Ingredient;
use crate::services::{Commandable, Queryable, Request};

mod models;
mod resources;

pub use self::models::{Pantry, PantryItem, UserId};
pub use self::resources::PantryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListPantry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddIngredient(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveIngredient(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearPantry;

impl Request for ListPantry {
    type Resp = Vec<Ingredient>;
}

impl Request for AddIngredient {
    type Resp = Ingredient;
}

impl Request for RemoveIngredient {
    type Resp = bool;
}

impl Request for ClearPantry {
    type Resp = bool;
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Queryable<ListPantry>
    for PantryStore<M>
{
    fn query(&self, _: ListPantry) -> Result<Vec<Ingredient>> {
        Ok(self.list()?)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<AddIngredient> for PantryStore<M>
{
    fn execute(&self, AddIngredient(raw): AddIngredient) -> Result<Ingredient> {
        Ok(self.add(&raw)?)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<RemoveIngredient> for PantryStore<M>
{
    fn execute(&self, RemoveIngredient(ingredient): RemoveIngredient) -> Result<bool> {
        Ok(self.remove(&ingredient)?)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<ClearPantry> for PantryStore<M>
{
    fn execute(&self, _: ClearPantry) -> Result<bool> {
        Ok(self.clear()?)
    }
}
