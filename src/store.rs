use std::collections::HashSet;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::config::atomic_write;
use crate::types::{default_site_category, PromptRecord, ShellError, SiteRecord};
use crate::util::{
    base_domain, dedup_keep_order, dedup_keep_order_ci, ensure_scheme, first_line_title,
    sanitize_character_name,
};

/// One user-editable collection kind. A collection supplies its wrapper key,
/// a normalizer tolerant of bare-string vs. object entries, and the cleanup
/// passes the layered engine runs around it.
pub(crate) trait Collection {
    type Record: Clone + Serialize;

    /// Top-level key wrapping the array in the override file.
    const KEY: &'static str;
    /// Whether an import file may be a bare array instead of `{KEY: [...]}`.
    const IMPORT_ACCEPTS_BARE: bool = true;
    /// Reseed from defaults when the override parses to an empty list.
    const RESEED_ON_EMPTY: bool = false;
    /// Write the working set back to disk after every load, so the override
    /// file always reflects the active in-memory state.
    const PERSIST_ON_LOAD: bool = false;

    fn normalize(raw: &Value, idx: usize) -> Option<Self::Record>;

    /// Cleanup shared by load and import (sanitize, dedup).
    fn post_normalize(records: Vec<Self::Record>) -> Vec<Self::Record> {
        records
    }

    /// Extra pass applied to the loaded working set only, never to imports.
    fn on_load(records: Vec<Self::Record>) -> Vec<Self::Record> {
        records
    }
}

/// The mutable user-override layer of one collection. The base defaults are
/// consulted only by `load_or_seed` and `restore_defaults`; every other read
/// serves from the override working set.
pub(crate) struct LayeredStore<C: Collection> {
    path: PathBuf,
    records: Vec<C::Record>,
    _collection: PhantomData<C>,
}

impl<C: Collection> LayeredStore<C> {
    /// Read the override file, seeding from `defaults` when it is missing or
    /// unparseable (or empty, for collections that reseed on empty). A seeded
    /// set is persisted immediately so the file exists after first run.
    pub(crate) fn load_or_seed(path: PathBuf, defaults: &[C::Record]) -> Self {
        let mut seeded = false;
        let records = match Self::read_entries(&path) {
            Some(entries) if !(C::RESEED_ON_EMPTY && entries.is_empty()) => entries,
            _ => {
                seeded = true;
                C::post_normalize(defaults.to_vec())
            }
        };
        let store = LayeredStore {
            path,
            records: C::on_load(records),
            _collection: PhantomData,
        };
        if seeded || C::PERSIST_ON_LOAD {
            if let Err(err) = store.save() {
                eprintln!("Could not write {}: {err}", store.path.display());
            }
        }
        store
    }

    fn read_entries(path: &Path) -> Option<Vec<C::Record>> {
        let data = fs::read_to_string(path).ok()?;
        let value: Value = serde_json::from_str(&data).ok()?;
        let entries = match &value {
            Value::Object(map) => match map.get(C::KEY) {
                Some(Value::Array(items)) => items.clone(),
                Some(_) => return None,
                None => Vec::new(),
            },
            Value::Array(items) => items.clone(),
            _ => return None,
        };
        Some(C::post_normalize(
            entries
                .iter()
                .enumerate()
                .filter_map(|(i, raw)| C::normalize(raw, i))
                .collect(),
        ))
    }

    pub(crate) fn records(&self) -> &[C::Record] {
        &self.records
    }

    fn wrapped(records: &[C::Record]) -> Result<String, ShellError> {
        let mut doc = serde_json::Map::new();
        doc.insert(C::KEY.to_string(), serde_json::to_value(records)?);
        Ok(serde_json::to_string_pretty(&Value::Object(doc))?)
    }

    /// Whole-file overwrite of the override layer.
    pub(crate) fn save(&self) -> Result<(), ShellError> {
        atomic_write(&self.path, &Self::wrapped(&self.records)?)?;
        Ok(())
    }

    /// Wholesale replace with the base defaults. `defaults` itself is never
    /// mutated. Confirmation is the caller's responsibility.
    pub(crate) fn restore_defaults(&mut self, defaults: &[C::Record]) -> Result<(), ShellError> {
        self.records = C::on_load(C::post_normalize(defaults.to_vec()));
        self.save()
    }

    /// Replace the override with an empty collection; defaults untouched.
    /// Confirmation is the caller's responsibility.
    pub(crate) fn clear(&mut self) -> Result<(), ShellError> {
        self.records.clear();
        self.save()
    }

    pub(crate) fn add(&mut self, record: C::Record) -> Result<(), ShellError> {
        self.records.push(record);
        self.save()
    }

    pub(crate) fn replace_at(&mut self, index: usize, record: C::Record) -> Result<(), ShellError> {
        self.records[index] = record;
        self.save()
    }

    pub(crate) fn remove<F>(&mut self, matcher: F) -> Result<usize, ShellError>
    where
        F: Fn(&C::Record) -> bool,
    {
        let before = self.records.len();
        self.records.retain(|r| !matcher(r));
        let removed = before - self.records.len();
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }

    /// Replace the working set with the file's contents, run through the same
    /// normalization as `load_or_seed`. A malformed file leaves the current
    /// in-memory and on-disk state untouched.
    pub(crate) fn import(&mut self, path: &Path) -> Result<usize, ShellError> {
        let data = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&data)
            .map_err(|e| ShellError::Format(format!("{}: {e}", path.display())))?;
        let entries = match &value {
            Value::Object(map) => match map.get(C::KEY) {
                Some(Value::Array(items)) => items.clone(),
                _ => {
                    return Err(ShellError::Format(format!(
                        "expected an object with a '{}' array",
                        C::KEY
                    )))
                }
            },
            Value::Array(items) if C::IMPORT_ACCEPTS_BARE => items.clone(),
            _ => {
                return Err(ShellError::Format(format!(
                    "expected an object with a '{}' array",
                    C::KEY
                )))
            }
        };
        self.records = C::post_normalize(
            entries
                .iter()
                .enumerate()
                .filter_map(|(i, raw)| C::normalize(raw, i))
                .collect(),
        );
        self.save()?;
        Ok(self.records.len())
    }

    pub(crate) fn export(&self, path: &Path) -> Result<(), ShellError> {
        atomic_write(path, &Self::wrapped(&self.records)?)?;
        Ok(())
    }
}

/// Normalize the raw default-layer entries of the base config into records
/// suitable for seeding or restoring a store.
pub(crate) fn normalize_defaults<C: Collection>(raw: &[Value]) -> Vec<C::Record> {
    raw.iter()
        .enumerate()
        .filter_map(|(i, entry)| C::normalize(entry, i))
        .collect()
}

/// Distinct categories in first-appearance order; blanks count as "Base".
pub(crate) fn extract_categories<I>(categories: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for c in categories {
        let c = if c.trim().is_empty() {
            "Base".to_string()
        } else {
            c
        };
        if seen.insert(c.clone()) {
            out.push(c);
        }
    }
    out
}

fn site_name_from_base(base: &str) -> String {
    let label = base.split('.').next().unwrap_or(base);
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn renumber_sites(records: &mut [SiteRecord]) {
    for (i, rec) in records.iter_mut().enumerate() {
        rec.id = (i + 1) as u32;
    }
}

pub(crate) struct SitesCollection;

impl Collection for SitesCollection {
    type Record = SiteRecord;

    const KEY: &'static str = "sites";

    fn normalize(raw: &Value, _idx: usize) -> Option<SiteRecord> {
        match raw {
            Value::Object(_) => {
                let mut rec: SiteRecord = serde_json::from_value(raw.clone()).ok()?;
                if rec.url.trim().is_empty() {
                    return None;
                }
                if rec.base.is_empty() {
                    rec.base = base_domain(&rec.url).unwrap_or_default();
                }
                Some(rec)
            }
            Value::String(s) if !s.trim().is_empty() => {
                let url = ensure_scheme(s);
                let base = base_domain(&url)?;
                Some(SiteRecord {
                    id: 0,
                    name: site_name_from_base(&base),
                    url,
                    base,
                    category: default_site_category(),
                    free_tier: true,
                    notes: String::new(),
                })
            }
            _ => None,
        }
    }

    // Ids are a user-facing dense 1..N ordinal sequence; gaps are not
    // tolerated, so every normalized set is renumbered in place.
    fn post_normalize(mut records: Vec<SiteRecord>) -> Vec<SiteRecord> {
        renumber_sites(&mut records);
        records
    }
}

impl LayeredStore<SitesCollection> {
    /// Add a site deduplicated by base domain, not by full URL.
    pub(crate) fn add_site(&mut self, url: &str) -> Result<SiteRecord, ShellError> {
        let url = ensure_scheme(url);
        let base = base_domain(&url).ok_or_else(|| {
            ShellError::Format(format!("could not parse a base domain from '{url}'"))
        })?;
        if self.records.iter().any(|s| s.base == base) {
            return Err(ShellError::Format(format!(
                "a site for base '{base}' already exists"
            )));
        }
        let id = self.records.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        let record = SiteRecord {
            id,
            name: site_name_from_base(&base),
            url,
            base,
            category: default_site_category(),
            free_tier: true,
            notes: String::new(),
        };
        self.add(record.clone())?;
        Ok(record)
    }

    /// Remove every record sharing the selected record's base domain, then
    /// renumber the survivors back to a contiguous 1..N sequence.
    pub(crate) fn remove_site(&mut self, id: u32) -> Result<Option<String>, ShellError> {
        let base = match self.records.iter().find(|s| s.id == id) {
            Some(site) => site.base.clone(),
            None => return Ok(None),
        };
        self.records.retain(|s| s.base != base);
        renumber_sites(&mut self.records);
        self.save()?;
        Ok(Some(base))
    }
}

pub(crate) struct PromptsCollection;

impl Collection for PromptsCollection {
    type Record = PromptRecord;

    const KEY: &'static str = "prompts";
    const IMPORT_ACCEPTS_BARE: bool = false;
    const RESEED_ON_EMPTY: bool = true;
    const PERSIST_ON_LOAD: bool = true;

    fn normalize(raw: &Value, _idx: usize) -> Option<PromptRecord> {
        match raw {
            Value::String(s) => {
                let text = s.trim().to_string();
                Some(PromptRecord {
                    id: None,
                    title: first_line_title(&text, 60),
                    category: "Base".to_string(),
                    tags: Vec::new(),
                    text,
                })
            }
            Value::Object(map) => {
                let text = map
                    .get("text")
                    .or_else(|| map.get("prompt"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .to_string();
                let title = map
                    .get("title")
                    .and_then(Value::as_str)
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| t.trim().to_string())
                    .unwrap_or_else(|| first_line_title(&text, 60));
                let category = map
                    .get("category")
                    .and_then(Value::as_str)
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or("Base")
                    .to_string();
                let tags = map
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|t| t.trim().to_string())
                            .filter(|t| !t.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();
                let id = map
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|i| !i.trim().is_empty())
                    .map(|i| i.to_string());
                Some(PromptRecord {
                    id,
                    title,
                    category,
                    tags,
                    text,
                })
            }
            _ => None,
        }
    }
}

impl LayeredStore<PromptsCollection> {
    pub(crate) fn add_prompt(
        &mut self,
        title: Option<String>,
        category: Option<String>,
        tags: Vec<String>,
        text: String,
    ) -> Result<PromptRecord, ShellError> {
        let text = text.trim().to_string();
        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| first_line_title(&text, 60));
        let category = category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "User".to_string());
        // Ids are lookup keys, so a freed slot is never reused: the next id
        // comes from the highest surviving uNNNN suffix, not the list length.
        let next = self
            .records
            .iter()
            .filter_map(|r| r.id.as_deref())
            .filter_map(|id| id.strip_prefix('u'))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .map_or(0, |n| n + 1);
        let record = PromptRecord {
            id: Some(format!("u{next:04}")),
            title,
            category,
            tags,
            text,
        };
        self.add(record.clone())?;
        Ok(record)
    }

    pub(crate) fn categories(&self) -> Vec<String> {
        extract_categories(self.records.iter().map(|r| r.category.clone()))
    }
}

pub(crate) struct CharactersCollection;

impl Collection for CharactersCollection {
    type Record = String;

    const KEY: &'static str = "characters";

    fn normalize(raw: &Value, _idx: usize) -> Option<String> {
        let name = match raw {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("name").and_then(Value::as_str)?,
            _ => return None,
        };
        let name = name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    fn post_normalize(records: Vec<String>) -> Vec<String> {
        let sanitized = records
            .into_iter()
            .map(|name| sanitize_character_name(&name))
            .filter(|name| !name.is_empty())
            .collect();
        dedup_keep_order_ci(sanitized)
    }

    // The working set is shown sorted; imports keep first-occurrence order.
    fn on_load(mut records: Vec<String>) -> Vec<String> {
        records.sort_by_key(|name| name.to_lowercase());
        records
    }
}

impl LayeredStore<CharactersCollection> {
    /// Returns the sanitized name, or `None` when it already exists
    /// (case-insensitively).
    pub(crate) fn add_character(&mut self, name: &str) -> Result<Option<String>, ShellError> {
        let name = sanitize_character_name(name);
        if name.is_empty() {
            return Err(ShellError::Format(
                "character name is empty after sanitizing".to_string(),
            ));
        }
        let lower = name.to_lowercase();
        if self.records.iter().any(|n| n.to_lowercase() == lower) {
            return Ok(None);
        }
        self.records.push(name.clone());
        self.records.sort_by_key(|n| n.to_lowercase());
        self.save()?;
        Ok(Some(name))
    }
}

pub(crate) struct MailSitesCollection;

impl Collection for MailSitesCollection {
    type Record = String;

    const KEY: &'static str = "mail_sites";

    fn normalize(raw: &Value, _idx: usize) -> Option<String> {
        let url = match raw {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("url").and_then(Value::as_str)?,
            _ => return None,
        };
        let url = url.trim();
        if url.is_empty() {
            None
        } else {
            Some(url.to_string())
        }
    }

    fn post_normalize(records: Vec<String>) -> Vec<String> {
        dedup_keep_order(records.into_iter().map(|u| ensure_scheme(&u)).collect())
    }
}

impl LayeredStore<MailSitesCollection> {
    /// Returns the stored URL, or `None` when it is already present.
    pub(crate) fn add_mail_site(&mut self, url: &str) -> Result<Option<String>, ShellError> {
        let url = ensure_scheme(url);
        if self.records.iter().any(|u| u == &url) {
            return Ok(None);
        }
        self.records.push(url.clone());
        self.save()?;
        Ok(Some(url))
    }
}
