use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A trimmed, lower-cased, non-empty ingredient name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ingredient(String);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngredientSet(BTreeSet<Ingredient>);

const MAX_COMPLETIONS: usize = 8;
const QUICK_PICKS: usize = 10;

pub const COMMON_INGREDIENTS: &[&str] = &[
    "tomato",
    "egg",
    "rice",
    "onion",
    "garlic",
    "chicken",
    "beef",
    "pasta",
    "bread",
    "milk",
    "cheese",
    "butter",
    "olive oil",
    "salt",
    "pepper",
    "carrot",
    "potato",
    "lettuce",
    "spinach",
    "bell pepper",
    "mushroom",
    "lemon",
    "flour",
    "sugar",
    "yogurt",
    "salmon",
    "tuna",
    "broccoli",
    "cucumber",
    "avocado",
    "banana",
    "apple",
    "orange",
    "ginger",
    "basil",
];

pub fn canonical(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl Ingredient {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let name = canonical(raw);
        if name.is_empty() {
            return Err(Error::EmptyIngredient);
        }
        Ok(Ingredient(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl Borrow<str> for Ingredient {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ingredient {
    type Error = Error;
    fn try_from(raw: String) -> Result<Self, Error> {
        Ingredient::parse(&raw)
    }
}

impl From<Ingredient> for String {
    fn from(ingredient: Ingredient) -> String {
        ingredient.0
    }
}

impl IngredientSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.0.contains(canonical(raw).as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ingredient> {
        self.0.iter()
    }

    /// Hash of the set's contents; independent of the order ingredients
    /// were added in.
    pub fn fingerprint(&self) -> u64 {
        let mut h = siphasher::sip::SipHasher24::new();
        self.0.len().hash(&mut h);
        for ingredient in self.0.iter() {
            ingredient.hash(&mut h);
        }
        h.finish()
    }
}

impl FromIterator<Ingredient> for IngredientSet {
    fn from_iter<I: IntoIterator<Item = Ingredient>>(iter: I) -> Self {
        IngredientSet(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a Ingredient> for IngredientSet {
    fn from_iter<I: IntoIterator<Item = &'a Ingredient>>(iter: I) -> Self {
        iter.into_iter().cloned().collect()
    }
}

pub fn quick_picks(owned: &IngredientSet) -> Vec<(&'static str, bool)> {
    COMMON_INGREDIENTS
        .iter()
        .take(QUICK_PICKS)
        .map(|&name| (name, owned.contains(name)))
        .collect()
}

pub fn complete(query: &str, owned: &IngredientSet) -> Vec<&'static str> {
    let query = canonical(query);
    if query.is_empty() {
        return Vec::new();
    }
    COMMON_INGREDIENTS
        .iter()
        .copied()
        .filter(|name| name.contains(query.as_str()) && !owned.contains(name))
        .take(MAX_COMPLETIONS)
        .collect()
}
