use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use infra::documents::{DocMeta, HasMeta};
use infra::ids::{Entity, Id};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Recipe {
    #[serde(flatten)]
    pub meta: DocMeta<Recipe>,
    pub name: String,
    pub description: String,
    /// As written by the recipe author; compared in canonical form.
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    #[serde(rename = "cooking_time", alias = "cookingTime")]
    pub cooking_time: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(rename = "cooking_time", alias = "cookingTime")]
    pub cooking_time: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct RecipePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Option<Vec<String>>,
    #[serde(default)]
    pub instructions: Option<Vec<String>>,
    #[serde(default, rename = "cooking_time", alias = "cookingTime")]
    pub cooking_time: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// The ordered list of catalog entries, oldest first. Re-saved on every
/// catalog change so its version identifies a catalog revision.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RecipeIndex {
    #[serde(flatten)]
    pub(super) meta: DocMeta<RecipeIndex>,
    pub(super) recipes: Vec<Id<Recipe>>,
    #[serde(default)]
    pub(super) revision: u64,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        };
        fmt.write_str(label)
    }
}

impl FromStr for Difficulty {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(Error::InvalidRecipe(format!("unknown difficulty {:?}", s))),
        }
    }
}

impl Recipe {
    pub fn id(&self) -> Id<Recipe> {
        self.meta.id
    }

    pub(super) fn from_draft(id: Id<Recipe>, draft: RecipeDraft, now: DateTime<Utc>) -> Self {
        let RecipeDraft {
            name,
            description,
            ingredients,
            instructions,
            cooking_time,
            difficulty,
            tags,
        } = draft;
        Recipe {
            meta: DocMeta::new_with_id(id),
            name,
            description,
            ingredients,
            instructions,
            cooking_time,
            difficulty,
            tags: dedup(tags),
            created_at: now,
            updated_at: now,
        }
    }

    pub(super) fn apply(&mut self, patch: RecipePatch, now: DateTime<Utc>) -> Result<(), Error> {
        if let Some(name) = patch.name {
            self.name = validated_name(name)?;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(ingredients) = patch.ingredients {
            self.ingredients = ingredients;
        }
        if let Some(instructions) = patch.instructions {
            self.instructions = instructions;
        }
        if let Some(cooking_time) = patch.cooking_time {
            self.cooking_time = cooking_time;
        }
        if let Some(difficulty) = patch.difficulty {
            self.difficulty = difficulty;
        }
        if let Some(tags) = patch.tags {
            self.tags = dedup(tags);
        }
        self.updated_at = now;
        Ok(())
    }
}

impl RecipeDraft {
    pub(super) fn validate(mut self) -> Result<Self, Error> {
        self.name = validated_name(self.name)?;
        Ok(self)
    }
}

impl RecipeIndex {
    pub(super) fn new() -> Self {
        RecipeIndex {
            meta: DocMeta::new_with_id(Self::id()),
            recipes: Vec::new(),
            revision: 0,
        }
    }

    pub(super) fn id() -> Id<RecipeIndex> {
        Id::hashed("RecipeIndex")
    }

    pub(super) fn newest_first(&self) -> impl Iterator<Item = &Id<Recipe>> {
        self.recipes.iter().rev()
    }

    pub(super) fn touch(&mut self) {
        self.revision += 1;
    }
}

fn validated_name(name: String) -> Result<String, Error> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidRecipe("name is empty".into()));
    }
    Ok(trimmed.to_string())
}

fn dedup(tags: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        if !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}

impl Entity for Recipe {
    const PREFIX: &'static str = "recipe";
}

impl HasMeta for Recipe {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}

impl Entity for RecipeIndex {
    const PREFIX: &'static str = "recipe_index";
}

impl HasMeta for RecipeIndex {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}
