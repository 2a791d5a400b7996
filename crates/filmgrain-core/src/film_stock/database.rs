//! In-memory film stock database loaded from JSON.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::schema::StockRecord;
use super::{FilmStock, FilmType};
use crate::error::{FilmGrainError, Result};

/// Stocks shipped with the crate.
const BUILTIN_STOCKS: &str = include_str!("../../stocks/builtin.json");

/// Read-only access to film stock descriptors.
///
/// The engine resolves stocks only through this trait, so callers can back it
/// with anything that produces valid descriptors.
pub trait StockLookup: Send + Sync {
    /// Look up a stock by id.
    fn get(&self, id: &str) -> Option<Arc<FilmStock>>;

    /// Every stock currently available, in no particular order.
    fn all(&self) -> Vec<Arc<FilmStock>>;
}

/// Film stocks keyed by id.
#[derive(Debug, Default, Clone)]
pub struct FilmStockDatabase {
    stocks: HashMap<String, Arc<FilmStock>>,
}

impl FilmStockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// A database preloaded with the built-in stocks.
    pub fn with_builtin() -> Result<Self> {
        let mut db = Self::new();
        db.load_from_json(BUILTIN_STOCKS)?;
        Ok(db)
    }

    /// Parse a JSON document of stocks keyed by id and add them.
    ///
    /// A top-level `metadata` entry is skipped. Records that fail to
    /// deserialize or validate are skipped with a warning; only a document
    /// that is not a JSON object is an error. Returns the number of stocks
    /// added or replaced.
    pub fn load_from_json(&mut self, json: &str) -> Result<usize> {
        let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;

        let mut loaded = 0;
        for (id, value) in entries {
            if id == "metadata" {
                continue;
            }

            let stock = serde_json::from_value::<StockRecord>(value)
                .map_err(FilmGrainError::from)
                .and_then(|record| record.into_stock(&id));

            match stock.and_then(|s| self.insert(s)) {
                Ok(()) => {
                    tracing::debug!("Loaded film stock: {id}");
                    loaded += 1;
                }
                Err(e) => tracing::warn!("Skipping film stock {id}: {e}"),
            }
        }

        tracing::info!("Loaded {loaded} film stocks ({} total)", self.stocks.len());
        Ok(loaded)
    }

    /// Read and parse a JSON stock file.
    pub fn load_from_file(&mut self, path: &Path) -> Result<usize> {
        let json = std::fs::read_to_string(path)?;
        self.load_from_json(&json)
    }

    /// Validate and store a descriptor, replacing any stock with the same id.
    pub fn insert(&mut self, stock: FilmStock) -> Result<()> {
        stock.validate()?;
        self.stocks.insert(stock.id.clone(), Arc::new(stock));
        Ok(())
    }

    /// Sorted list of stock ids.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stocks.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    /// Stocks of one type, sorted by id.
    pub fn by_type(&self, film_type: FilmType) -> Vec<Arc<FilmStock>> {
        self.filtered(|s| s.film_type == film_type)
    }

    /// Stocks whose ISO speed lies in `[min_iso, max_iso]`, sorted by id.
    pub fn by_iso(&self, min_iso: u32, max_iso: u32) -> Vec<Arc<FilmStock>> {
        self.filtered(|s| (min_iso..=max_iso).contains(&s.iso_speed))
    }

    /// Case-insensitive substring search over id, name and manufacturer.
    pub fn search(&self, query: &str) -> Vec<Arc<FilmStock>> {
        let needle = query.to_lowercase();
        self.filtered(|s| {
            s.id.to_lowercase().contains(&needle)
                || s.display_name.to_lowercase().contains(&needle)
                || s.manufacturer.to_lowercase().contains(&needle)
        })
    }

    fn filtered(&self, keep: impl Fn(&FilmStock) -> bool) -> Vec<Arc<FilmStock>> {
        let mut out: Vec<Arc<FilmStock>> = self
            .stocks
            .values()
            .filter(|s| keep(s))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

impl StockLookup for FilmStockDatabase {
    fn get(&self, id: &str) -> Option<Arc<FilmStock>> {
        self.stocks.get(id).cloned()
    }

    fn all(&self) -> Vec<Arc<FilmStock>> {
        self.stocks.values().cloned().collect()
    }
}
