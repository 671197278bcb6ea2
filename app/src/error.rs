use err_derive::Error;

use crate::ingredients::Ingredient;

#[derive(Debug, Error)]
pub enum Error {
    #[error(display = "ingredient name is empty")]
    EmptyIngredient,
    #[error(display = "{} is already in the pantry", _0)]
    DuplicateIngredient(Ingredient),
    #[error(display = "invalid recipe: {}", _0)]
    InvalidRecipe(String),
    #[error(display = "no such recipe: {}", _0)]
    RecipeNotFound(String),
    #[error(display = "persistence failure: {:#}", _0)]
    Persistence(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Persistence,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyIngredient | Error::DuplicateIngredient(_) | Error::InvalidRecipe(_) => {
                ErrorKind::Validation
            }
            Error::RecipeNotFound(_) => ErrorKind::NotFound,
            Error::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Persistence(err)
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Persistence(err.into())
    }
}
