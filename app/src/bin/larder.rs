use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use log::*;
use serde::{Deserialize, Serialize};
use structopt::StructOpt;

use infra::ids::Id;
use jemallocator_global as _;
use larder::config::{EnvLogger, EnvOverrides};
use larder::ingredients::{self, IngredientSet};
use larder::matcher::{self, MatchResult};
use larder::pantry::{AddIngredient, ClearPantry, ListPantry, RemoveIngredient, UserId};
use larder::recipes::{
    self, CreateRecipe, DeleteRecipe, Difficulty, Recipe, RecipePatch, SeedCatalog, ShowCatalog,
    ShowRecipe, UpdateRecipe,
};
use larder::services::{Commandable, Queryable};
use larder::suggestions::SuggestRecipes;
use larder::{Error, ErrorKind, Larder};

#[derive(Debug, StructOpt)]
#[structopt(name = "larder", about = "Recipe suggestions from what is in your pantry")]
struct Opt {
    /// Config file
    #[structopt(parse(from_os_str))]
    config: PathBuf,
    /// Whose pantry to use; defaults to $LARDER_USER
    #[structopt(long = "user")]
    user: Option<String>,
    /// Print results as JSON
    #[structopt(long = "json")]
    json: bool,
    #[structopt(subcommand)]
    command: Commands,
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "setup", about = "Initialize storage")]
    Setup,
    #[structopt(name = "add", about = "Add ingredients to the pantry")]
    Add {
        #[structopt(required = true)]
        ingredients: Vec<String>,
    },
    #[structopt(name = "remove", about = "Remove an ingredient from the pantry")]
    Remove { ingredient: String },
    #[structopt(name = "clear", about = "Empty the pantry")]
    Clear,
    #[structopt(name = "pantry", about = "Show the pantry")]
    Pantry {
        /// Also show the quick-pick list
        #[structopt(long = "picks")]
        picks: bool,
    },
    #[structopt(name = "complete", about = "Suggest common ingredients")]
    Complete { query: String },
    #[structopt(name = "recipes", about = "List the catalog")]
    Recipes,
    #[structopt(name = "show", about = "Show one recipe against the pantry")]
    Show { id: Id<Recipe> },
    #[structopt(name = "import", about = "Add recipes from a TOML file")]
    Import {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    #[structopt(name = "update", about = "Change fields of a recipe")]
    Update {
        id: Id<Recipe>,
        #[structopt(flatten)]
        patch: PatchOpts,
    },
    #[structopt(name = "delete", about = "Delete a recipe")]
    Delete { id: Id<Recipe> },
    #[structopt(name = "suggest", about = "Rank recipes against the pantry")]
    Suggest {
        /// Only show the best N
        #[structopt(long = "limit")]
        limit: Option<usize>,
    },
    #[structopt(name = "seed", about = "Load the bundled recipes")]
    Seed,
    #[structopt(name = "wipe", about = "Delete every pantry and recipe")]
    Wipe,
}

#[derive(Debug, StructOpt)]
struct PatchOpts {
    #[structopt(long = "name")]
    name: Option<String>,
    #[structopt(long = "description")]
    description: Option<String>,
    /// Comma separated
    #[structopt(long = "ingredients")]
    ingredients: Option<String>,
    /// Repeat for each step
    #[structopt(long = "instruction")]
    instructions: Vec<String>,
    #[structopt(long = "cooking-time")]
    cooking_time: Option<String>,
    #[structopt(long = "difficulty")]
    difficulty: Option<Difficulty>,
    /// Comma separated
    #[structopt(long = "tags")]
    tags: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Config {
    #[serde(flatten)]
    larder: larder::config::Config,
    #[serde(default)]
    env_logger: EnvLogger,
}

#[derive(Serialize)]
struct PantryView<'a> {
    ingredients: &'a [ingredients::Ingredient],
    #[serde(skip_serializing_if = "Option::is_none")]
    quick_picks: Option<Vec<QuickPick>>,
}

#[derive(Serialize)]
struct QuickPick {
    name: &'static str,
    owned: bool,
}

fn main() {
    if let Err(err) = run() {
        error!("{:?}", err);
        eprintln!("{}", describe(&err));
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let opt = Opt::from_args();

    let config_buf =
        fs::read_to_string(&opt.config).with_context(|| format!("read {:?}", opt.config))?;
    let mut config: Config = toml::from_str(&config_buf).context("parse config")?;

    config.env_logger.builder().init();
    debug!("Options: {:?}", opt);

    let overrides = EnvOverrides::from_env()?;
    overrides.apply(&mut config.larder);
    let user = opt
        .user
        .clone()
        .or_else(|| overrides.user.clone())
        .map(UserId::new)
        .unwrap_or_default();

    let app = Larder::new(&config.larder)?;
    let json = opt.json;

    match opt.command {
        Commands::Setup => {
            app.setup()?;
            println!("Storage ready.");
        }
        Commands::Add { ingredients } => {
            let pantry = app.pantry(&user);
            for raw in ingredients {
                let added = pantry.execute(AddIngredient(raw))?;
                println!("Added {}", added);
            }
        }
        Commands::Remove { ingredient } => {
            if app.pantry(&user).execute(RemoveIngredient(ingredient.clone()))? {
                println!("Removed {}", ingredient.trim());
            } else {
                println!("{} is not in your pantry.", ingredient.trim());
            }
        }
        Commands::Clear => {
            if app.pantry(&user).execute(ClearPantry)? {
                println!("Pantry cleared.");
            } else {
                println!("Your pantry is already empty.");
            }
        }
        Commands::Pantry { picks } => {
            let owned = app.pantry(&user).query(ListPantry)?;
            let quick_picks = if picks {
                let set = owned.iter().collect::<IngredientSet>();
                Some(
                    ingredients::quick_picks(&set)
                        .into_iter()
                        .map(|(name, owned)| QuickPick { name, owned })
                        .collect::<Vec<_>>(),
                )
            } else {
                None
            };
            let view = PantryView {
                ingredients: &owned,
                quick_picks,
            };
            if json {
                print_json(&view)?;
            } else {
                print_pantry(&view);
            }
        }
        Commands::Complete { query } => {
            let owned = app.pantry(&user).load()?.to_set();
            let completions = ingredients::complete(&query, &owned);
            if json {
                print_json(&completions)?;
            } else {
                for name in completions {
                    println!("{}", name);
                }
            }
        }
        Commands::Recipes => {
            let list = app.catalog().query(ShowCatalog)?;
            if json {
                print_json(&list)?;
            } else {
                for recipe in list {
                    println!(
                        "{}: {} ({}, {})",
                        recipe.id(),
                        recipe.name,
                        recipe.cooking_time,
                        recipe.difficulty
                    );
                }
            }
        }
        Commands::Show { id } => {
            let recipe = app.catalog().query(ShowRecipe(id))?;
            let owned = app.pantry(&user).load()?.to_set();
            let result = matcher::match_recipe(&owned, &recipe);
            if json {
                print_json(&result)?;
            } else {
                print_recipe(&result);
            }
        }
        Commands::Import { file } => {
            let text = fs::read_to_string(&file).with_context(|| format!("read {:?}", file))?;
            let catalog = app.catalog();
            for draft in recipes::parse_recipes(&text)? {
                let recipe = catalog.execute(CreateRecipe(draft))?;
                println!("Added {}: {}", recipe.id(), recipe.name);
            }
        }
        Commands::Update { id, patch } => {
            let recipe = app.catalog().execute(UpdateRecipe {
                id,
                patch: patch.into_patch(),
            })?;
            if json {
                print_json(&recipe)?;
            } else {
                println!("Updated {}: {}", recipe.id(), recipe.name);
            }
        }
        Commands::Delete { id } => {
            app.catalog().execute(DeleteRecipe(id))?;
            println!("Deleted {}", id);
        }
        Commands::Suggest { limit } => {
            let kitchen = app.kitchen(&user);
            let owned = kitchen.pantry().query(ListPantry)?;
            let ranked = kitchen.query(SuggestRecipes)?;
            let shown = &ranked[..limit.unwrap_or(ranked.len()).min(ranked.len())];
            if json {
                print_json(&shown)?;
            } else {
                print_suggestions(&owned, shown);
            }
        }
        Commands::Seed => {
            let added = app.catalog().execute(SeedCatalog)?;
            println!("Seeded {} recipes.", added.len());
        }
        Commands::Wipe => {
            app.wipe()?;
            println!("Everything is gone.");
        }
    }

    Ok(())
}

impl PatchOpts {
    fn into_patch(self) -> RecipePatch {
        RecipePatch {
            name: self.name,
            description: self.description,
            ingredients: self.ingredients.as_deref().map(split_list),
            instructions: Some(self.instructions).filter(|steps| !steps.is_empty()),
            cooking_time: self.cooking_time,
            difficulty: self.difficulty,
            tags: self.tags.as_deref().map(split_list),
        }
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_pantry(view: &PantryView) {
    if view.ingredients.is_empty() {
        println!("Your pantry is empty.");
    }
    for ingredient in view.ingredients {
        println!("{}", ingredient);
    }
    if let Some(picks) = view.quick_picks.as_ref() {
        println!();
        println!("Quick add:");
        for pick in picks {
            let mark = if pick.owned { "x" } else { " " };
            println!("  [{}] {}", mark, pick.name);
        }
    }
}

fn print_recipe(result: &MatchResult) {
    let recipe = &result.recipe;
    println!("{}", recipe.name);
    if !recipe.description.is_empty() {
        println!("{}", recipe.description);
    }
    println!("{} | {}", recipe.cooking_time, recipe.difficulty);
    if !recipe.tags.is_empty() {
        println!("Tags: {}", recipe.tags.join(", "));
    }
    println!();
    println!("{} ({}%)", result.summary(), result.percent());
    for (ingredient, have) in result.checklist() {
        let mark = if have { "x" } else { " " };
        println!("  [{}] {}", mark, ingredient);
    }
    println!();
    for (n, step) in recipe.instructions.iter().enumerate() {
        println!("{}. {}", n + 1, step);
    }
}

fn print_suggestions(owned: &[ingredients::Ingredient], ranked: &[MatchResult]) {
    match matcher::describe_pantry(owned) {
        Some(line) => println!("{}", line),
        None => {
            println!("No ingredients yet. Add some to your pantry to get suggestions.");
            return;
        }
    }
    if ranked.is_empty() {
        println!("No recipes in the catalog yet.");
        return;
    }
    for result in ranked {
        let ready = if result.can_make { " - ready to cook" } else { "" };
        println!(
            "{:>3}% {} ({}, {}){}",
            result.percent(),
            result.recipe.name,
            result.recipe.cooking_time,
            result.recipe.difficulty,
            ready
        );
        println!("     {}", result.summary());
        let missing = result.missing_ingredients();
        if !missing.is_empty() {
            println!("     missing: {}", missing.join(", "));
        }
    }
}

fn describe(err: &anyhow::Error) -> String {
    let err = match err.downcast_ref::<Error>() {
        Some(err) => err,
        None => return format!("Error: {:#}", err),
    };
    match err {
        Error::DuplicateIngredient(_) => "This ingredient is already in your pantry.".to_string(),
        Error::EmptyIngredient => "Please enter an ingredient name.".to_string(),
        err => match err.kind() {
            ErrorKind::Validation => format!("Invalid input: {}", err),
            ErrorKind::NotFound => format!("Not found: {}", err),
            ErrorKind::Persistence => format!("Could not reach storage: {}", err),
        },
    }
}
