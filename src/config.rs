use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::{BaseConfig, CharacterRecord, ShellError};

pub(crate) const CONFIG_FILE: &str = "splitshell_config.json";
pub(crate) const SITES_FILE: &str = "splitshell_user_sites.json";
pub(crate) const PROMPTS_FILE: &str = "splitshell_user_prompts.json";
pub(crate) const CHARACTERS_FILE: &str = "splitshell_user_characters.json";
pub(crate) const MAIL_SITES_FILE: &str = "splitshell_user_mail_sites.json";

/// Whole-file JSON write via a sibling-then-rename. The sibling suffix is
/// `.new`: the `.tmp` suffix is reserved for staged update bundles, whose
/// mere presence on disk is the "update pending" signal.
pub(crate) fn atomic_write(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut sibling = path.as_os_str().to_owned();
    sibling.push(".new");
    let sibling = PathBuf::from(sibling);
    fs::write(&sibling, contents)?;
    fs::rename(&sibling, path)?;
    Ok(())
}

/// The base configuration document: read-only default collections plus the
/// mutable `version` / `window` / `ui` settings.
pub(crate) struct ConfigRepository {
    path: PathBuf,
    pub(crate) doc: BaseConfig,
}

impl ConfigRepository {
    pub(crate) fn load(path: &Path) -> Result<Self, ShellError> {
        let doc = match fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).map_err(|e| {
                ShellError::Format(format!("base config {}: {e}", path.display()))
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                eprintln!("Config not found at {}; using defaults.", path.display());
                BaseConfig::default()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(ConfigRepository {
            path: path.to_path_buf(),
            doc,
        })
    }

    /// Persist `version` / `window` / `ui` only. The collection keys in the
    /// on-disk document are the default layer and are never touched here.
    pub(crate) fn save(&self) -> Result<(), ShellError> {
        let mut existing: Value = fs::read_to_string(&self.path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_else(|| json!({}));
        if !existing.is_object() {
            existing = json!({});
        }
        existing["version"] = json!(self.doc.version);
        existing["window"] = serde_json::to_value(&self.doc.window)?;
        existing["ui"] = serde_json::to_value(&self.doc.ui)?;
        atomic_write(&self.path, &serde_json::to_string_pretty(&existing)?)?;
        Ok(())
    }

    /// Base-layer character metadata: names joined with their category,
    /// defaulting to "Base" for bare-string entries.
    pub(crate) fn default_character_records(&self) -> Vec<CharacterRecord> {
        self.doc
            .characters
            .iter()
            .filter_map(|raw| match raw {
                Value::String(name) if !name.trim().is_empty() => Some(CharacterRecord {
                    name: name.trim().to_string(),
                    category: "Base".to_string(),
                }),
                Value::Object(map) => {
                    let name = map.get("name").and_then(Value::as_str)?.trim().to_string();
                    if name.is_empty() {
                        return None;
                    }
                    let category = map
                        .get("category")
                        .and_then(Value::as_str)
                        .filter(|c| !c.trim().is_empty())
                        .unwrap_or("Base")
                        .to_string();
                    Some(CharacterRecord { name, category })
                }
                _ => None,
            })
            .collect()
    }

    /// Category for a character name, joined case-insensitively against the
    /// base layer.
    pub(crate) fn character_category(&self, name: &str) -> String {
        let wanted = name.to_lowercase();
        self.default_character_records()
            .into_iter()
            .find(|rec| rec.name.to_lowercase() == wanted)
            .map(|rec| rec.category)
            .unwrap_or_else(|| "Base".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CharactersCollection, Collection};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "splitshell_config_{}_{name}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = temp_dir("missing");
        let repo = ConfigRepository::load(&dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(repo.doc.version, "0.0.0");
        assert!(repo.doc.sites.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn save_preserves_collection_keys() {
        let dir = temp_dir("save");
        let path = dir.join(CONFIG_FILE);
        let shipped = json!({
            "version": "1.0.0",
            "window": {"width": 800},
            "sites": [{"id": 1, "url": "https://a.example"}],
            "prompts": ["hello"],
        });
        fs::write(&path, serde_json::to_string_pretty(&shipped).unwrap()).unwrap();

        let mut repo = ConfigRepository::load(&path).unwrap();
        repo.doc.version = "1.1.0".to_string();
        repo.doc.window.orientation = "vertical".to_string();
        repo.save().unwrap();

        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["version"], "1.1.0");
        assert_eq!(on_disk["window"]["orientation"], "vertical");
        assert_eq!(on_disk["sites"][0]["url"], "https://a.example");
        assert_eq!(on_disk["prompts"][0], "hello");
        assert!(!dir.join(format!("{CONFIG_FILE}.new")).exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn character_category_join_is_case_insensitive() {
        let dir = temp_dir("chars");
        let path = dir.join(CONFIG_FILE);
        let shipped = json!({
            "characters": ["Alice", {"name": "Bob", "category": "Sidekick"}],
        });
        fs::write(&path, shipped.to_string()).unwrap();

        let repo = ConfigRepository::load(&path).unwrap();
        assert_eq!(repo.character_category("BOB"), "Sidekick");
        assert_eq!(repo.character_category("alice"), "Base");
        assert_eq!(repo.character_category("nobody"), "Base");

        let names: Vec<String> = repo
            .doc
            .characters
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| CharactersCollection::normalize(raw, i))
            .collect();
        assert_eq!(names, vec!["Alice".to_string(), "Bob".to_string()]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
