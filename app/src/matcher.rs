use std::cmp::Ordering;

use serde::Serialize;

use crate::ingredients::{Ingredient, IngredientSet};
use crate::recipes::Recipe;

const PREVIEW: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub matching_ingredients: Vec<String>,
    pub match_percentage: f64,
    pub can_make: bool,
}

pub fn match_recipe(pantry: &IngredientSet, recipe: &Recipe) -> MatchResult {
    let matching_ingredients = recipe
        .ingredients
        .iter()
        .filter(|ingredient| pantry.contains(ingredient))
        .cloned()
        .collect::<Vec<_>>();
    let required = recipe.ingredients.len();
    let match_percentage = if required == 0 {
        0.0
    } else {
        matching_ingredients.len() as f64 / required as f64
    };
    let can_make = required > 0 && matching_ingredients.len() == required;

    MatchResult {
        recipe: recipe.clone(),
        matching_ingredients,
        match_percentage,
        can_make,
    }
}

pub fn rank(pantry: &IngredientSet, catalog: &[Recipe]) -> Vec<MatchResult> {
    let mut results = catalog
        .iter()
        .map(|recipe| match_recipe(pantry, recipe))
        .collect::<Vec<_>>();
    // `sort_by` is stable.
    results.sort_by(best_first);
    results
}

fn best_first(a: &MatchResult, b: &MatchResult) -> Ordering {
    // Compare a.m/a.r against b.m/b.r without dividing.
    let (am, ar) = a.ratio();
    let (bm, br) = b.ratio();
    (bm * ar).cmp(&(am * br))
}

impl MatchResult {
    pub fn matched(&self) -> usize {
        self.matching_ingredients.len()
    }

    pub fn required(&self) -> usize {
        self.recipe.ingredients.len()
    }

    fn ratio(&self) -> (usize, usize) {
        match self.required() {
            0 => (0, 1),
            required => (self.matched(), required),
        }
    }

    pub fn percent(&self) -> u32 {
        (self.match_percentage * 100.0).round() as u32
    }

    pub fn summary(&self) -> String {
        format!(
            "You have {} of {} ingredients",
            self.matched(),
            self.required()
        )
    }

    pub fn has(&self, ingredient: &str) -> bool {
        self.matching_ingredients.iter().any(|m| m == ingredient)
    }

    pub fn missing_ingredients(&self) -> Vec<&str> {
        self.recipe
            .ingredients
            .iter()
            .map(String::as_str)
            .filter(|i| !self.has(i))
            .collect()
    }

    pub fn checklist(&self) -> Vec<(&str, bool)> {
        self.recipe
            .ingredients
            .iter()
            .map(|i| (i.as_str(), self.has(i)))
            .collect()
    }
}

/// "Based on your 5 ingredients: eggs, butter, salt and 2 more". `None`
/// for an empty pantry.
pub fn describe_pantry(ingredients: &[Ingredient]) -> Option<String> {
    if ingredients.is_empty() {
        return None;
    }
    let preview = ingredients
        .iter()
        .take(PREVIEW)
        .map(Ingredient::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let mut line = format!(
        "Based on your {} ingredients: {}",
        ingredients.len(),
        preview
    );
    if ingredients.len() > PREVIEW {
        line.push_str(&format!(" and {} more", ingredients.len() - PREVIEW));
    }
    Some(line)
}
