use anyhow::{anyhow, Context, Result};
use err_derive::Error;
use log::*;
use postgres::GenericConnection;
use r2d2::ManageConnection;
use r2d2_postgres::PostgresConnectionManager;
use serde::{de::DeserializeOwned, Serialize};

use crate::documents::{HasMeta, Version};
use crate::ids::{Entity, Id};

#[derive(Debug, Error, PartialEq, Eq)]
#[error(display = "stale version")]
pub struct ConcurrencyError;

pub trait Storage {
    fn setup(&self) -> Result<()>;
    fn load<D: DeserializeOwned + Entity>(&self, id: &Id<D>) -> Result<Option<D>>;
    fn save<D: Serialize + HasMeta>(&self, document: &mut D) -> Result<()>;
    fn delete<D: HasMeta>(&self, document: &D) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// True when `err` was caused by a lost optimistic-concurrency race.
pub fn is_conflict(err: &anyhow::Error) -> bool {
    err.chain().any(|e| e.downcast_ref::<ConcurrencyError>().is_some())
}

pub struct DocumentConnectionManager(PostgresConnectionManager);

pub struct Documents {
    connection: postgres::Connection,
}

const SETUP_SQL: &str = include_str!("persistence.sql");
const LOAD_SQL: &str = "SELECT body FROM documents WHERE id = $1";
const INSERT_SQL: &str = "WITH a as (\
                            SELECT $1::jsonb as body\
                          )\
                          INSERT INTO documents (id, body) \
                          SELECT a.body ->> '_id', jsonb_set(a.body, '{_version}', to_jsonb(to_hex(txid_current())))
                          FROM a
                          WHERE NOT EXISTS (
                              SELECT 1 FROM documents d where d.id = a.body ->> '_id'
                          )";
const UPDATE_SQL: &str = "WITH a as (
                            SELECT $1::jsonb as body
                          )
                          UPDATE documents AS d
                              SET body = jsonb_set(a.body, '{_version}', to_jsonb(to_hex(txid_current())))
                              FROM a
                              WHERE id = a.body ->> '_id'
                              AND d.body -> '_version' = a.body -> '_version'";
const DELETE_SQL: &str = "DELETE FROM documents WHERE id = $1 AND body ->> '_version' = $2";
const CLEAR_SQL: &str = "DELETE FROM documents";
const VERSION_SQL: &str = "SELECT to_hex(txid_current())";

impl DocumentConnectionManager {
    pub fn new(inner: PostgresConnectionManager) -> Self {
        DocumentConnectionManager(inner)
    }
}

impl ManageConnection for DocumentConnectionManager {
    type Connection = Documents;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let connection = self.0.connect()?;
        Ok(Documents { connection })
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        self.0.is_valid(&mut conn.connection)
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        self.0.has_broken(&mut conn.connection)
    }
}

impl std::fmt::Debug for DocumentConnectionManager {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("DocumentConnectionManager").finish()
    }
}

impl Documents {
    pub fn get_ref(&self) -> &postgres::Connection {
        &self.connection
    }
}

impl Storage for Documents {
    fn setup(&self) -> Result<()> {
        self.connection
            .batch_execute(SETUP_SQL)
            .context("create documents table")?;
        Ok(())
    }

    fn load<D: DeserializeOwned + Entity>(&self, id: &Id<D>) -> Result<Option<D>> {
        let load = self.connection.prepare_cached(LOAD_SQL)?;
        let res = load.query(&[&id.to_string()])?;

        if let Some(row) = res.iter().next() {
            let json: serde_json::Value = row
                .get_opt(0)
                .ok_or_else(|| anyhow!("Missing column in row?"))??;
            let doc = serde_json::from_value(json).with_context(|| format!("decode {}", id))?;
            debug!("Loaded {}", id);
            Ok(Some(doc))
        } else {
            debug!("No document at {}", id);
            Ok(None)
        }
    }

    fn save<D: Serialize + HasMeta>(&self, document: &mut D) -> Result<()> {
        let json = serde_json::to_value(&*document)?;
        let t = self.connection.transaction()?;
        let sql = if document.meta().version.is_unsaved() {
            INSERT_SQL
        } else {
            UPDATE_SQL
        };
        let nrows = t.prepare_cached(sql)?.execute(&[&json])?;
        debug!("Save of {} modified {} rows", document.meta().id, nrows);
        if nrows != 1 {
            warn!("Save impacted {} rows not 1", nrows);
            return Err(ConcurrencyError.into());
        }
        let version = current_version(&t)?;
        t.commit()?;
        document.meta_mut().version = version;
        Ok(())
    }

    fn delete<D: HasMeta>(&self, document: &D) -> Result<()> {
        let meta = document.meta();
        let nrows = self
            .connection
            .prepare_cached(DELETE_SQL)?
            .execute(&[&meta.id.to_string(), &meta.version.as_str()])?;
        debug!("Delete of {} removed {} rows", meta.id, nrows);
        if nrows != 1 {
            return Err(ConcurrencyError.into());
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let nrows = self.connection.execute(CLEAR_SQL, &[])?;
        info!("Cleared {} documents", nrows);
        Ok(())
    }
}

fn current_version<C: GenericConnection>(conn: &C) -> Result<Version> {
    let res = conn.prepare_cached(VERSION_SQL)?.query(&[])?;
    let version: String = res
        .iter()
        .next()
        .ok_or_else(|| anyhow!("Missing version row?"))?
        .get_opt(0)
        .ok_or_else(|| anyhow!("Missing version column?"))??;
    Ok(Version::new(version))
}
