use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use infra::documents::{DocMeta, HasMeta};
use infra::ids::{Entity, Id};

use crate::error::Error;
use crate::ingredients::{Ingredient, IngredientSet};

const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PantryItem {
    pub ingredient: Ingredient,
    pub added_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Pantry {
    #[serde(flatten)]
    pub(super) meta: DocMeta<Pantry>,
    pub(super) owner: UserId,
    /// Oldest first.
    #[serde(default)]
    pub(super) items: Vec<PantryItem>,
}

impl UserId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        UserId(id.into())
    }

    pub fn anonymous() -> Self {
        UserId::new(ANONYMOUS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl Pantry {
    pub(super) fn new(owner: UserId) -> Self {
        let meta = DocMeta::new_with_id(Self::id(&owner));
        Pantry {
            meta,
            owner,
            items: Vec::new(),
        }
    }

    pub(super) fn id(owner: &UserId) -> Id<Pantry> {
        Id::hashed(&("pantry", owner.as_str()))
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn contains(&self, ingredient: &Ingredient) -> bool {
        self.items.iter().any(|i| &i.ingredient == ingredient)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &PantryItem> {
        self.items.iter().rev()
    }

    pub fn ingredients(&self) -> impl Iterator<Item = &Ingredient> {
        self.items().map(|i| &i.ingredient)
    }

    pub fn to_set(&self) -> IngredientSet {
        self.ingredients().collect()
    }

    pub(super) fn add(&mut self, ingredient: Ingredient, at: DateTime<Utc>) -> Result<(), Error> {
        if self.contains(&ingredient) {
            return Err(Error::DuplicateIngredient(ingredient));
        }
        self.items.push(PantryItem {
            ingredient,
            added_at: at,
        });
        Ok(())
    }

    pub(super) fn remove(&mut self, ingredient: &Ingredient) -> bool {
        let before = self.items.len();
        self.items.retain(|i| &i.ingredient != ingredient);
        self.items.len() != before
    }

    pub(super) fn clear(&mut self) -> bool {
        let had_items = !self.items.is_empty();
        self.items.clear();
        had_items
    }
}

impl Entity for Pantry {
    const PREFIX: &'static str = "pantry";
}

impl HasMeta for Pantry {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ingredient(raw: &str) -> Ingredient {
        Ingredient::parse(raw).expect("ingredient")
    }

    #[test]
    fn each_user_gets_their_own_document() {
        assert_eq!(
            Pantry::id(&UserId::new("alice")),
            Pantry::id(&UserId::new("alice"))
        );
        assert_ne!(
            Pantry::id(&UserId::new("alice")),
            Pantry::id(&UserId::anonymous())
        );
    }

    #[test]
    fn second_add_is_rejected_as_duplicate() {
        let mut pantry = Pantry::new(UserId::anonymous());
        pantry.add(ingredient("Tomato"), Utc::now()).expect("first add");

        match pantry.add(ingredient("  tomato "), Utc::now()) {
            Err(Error::DuplicateIngredient(dup)) => assert_eq!(dup.as_str(), "tomato"),
            other => panic!("expected duplicate; got {:?}", other),
        }
        assert_eq!(pantry.len(), 1);
    }

    #[test]
    fn ingredients_are_listed_newest_first() {
        let mut pantry = Pantry::new(UserId::anonymous());
        for name in &["eggs", "butter", "salt"] {
            pantry.add(ingredient(name), Utc::now()).expect("add");
        }

        let names = pantry.ingredients().map(|i| i.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["salt", "butter", "eggs"]);
    }

    #[test]
    fn removing_an_absent_ingredient_changes_nothing() {
        let mut pantry = Pantry::new(UserId::anonymous());
        pantry.add(ingredient("eggs"), Utc::now()).expect("add");

        assert!(!pantry.remove(&ingredient("milk")));
        assert_eq!(pantry.len(), 1);
        assert!(pantry.remove(&ingredient("eggs")));
        assert!(pantry.is_empty());
    }

    #[test]
    fn clear_reports_whether_it_did_anything() {
        let mut pantry = Pantry::new(UserId::anonymous());
        assert!(!pantry.clear());
        pantry.add(ingredient("eggs"), Utc::now()).expect("add");
        assert!(pantry.clear());
        assert!(pantry.is_empty());
    }
}
