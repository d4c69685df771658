use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context as _;
use infrastructure::{EventBus, EventListener};

use super::{SettingChanged, SettingsStore};

/// Settings kept as a flat JSON object on disk. The whole file is rewritten on every
/// write, concurrent writers overwrite each other.
pub struct FileSettingsStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
    events: EventBus<SettingChanged>,
}

impl FileSettingsStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Error reading settings file {}", path.display()))?;

            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Error parsing settings file {}", path.display()))?
            }
        } else {
            tracing::info!("Settings file {} does not exist yet, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            events: EventBus::new(32),
        })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Error creating settings directory {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Error writing settings file {}", self.path.display()))
    }

    fn apply(&self, updates: &[(&str, String)]) -> anyhow::Result<()> {
        let changed: Vec<SettingChanged> = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

            let changed = updates
                .iter()
                .filter_map(|(key, value)| {
                    let previous = entries.insert((*key).to_owned(), value.clone());
                    (previous.as_ref() != Some(value)).then(|| SettingChanged {
                        key: (*key).to_owned(),
                        value: value.clone(),
                    })
                })
                .collect::<Vec<_>>();

            if !changed.is_empty() {
                self.flush(&entries)?;
            }

            changed
        };

        let emitter = self.events.emitter();
        for event in changed {
            emitter.send(event);
        }

        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.apply(&[(key, value.to_owned())])
    }

    fn subscribe(&self) -> EventListener<SettingChanged> {
        self.events.subscribe()
    }

    fn set_many(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        self.apply(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("window-control-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn values_survive_reopen() {
        let path = temp_path("reopen");
        let _ = std::fs::remove_file(&path);

        {
            let store = FileSettingsStore::open(&path).unwrap();
            store
                .set_many(&[("sliderValue", "70".to_owned()), ("isOpen", "true".to_owned())])
                .unwrap();
        }

        let store = FileSettingsStore::open(&path).unwrap();
        assert_eq!(store.get("sliderValue").as_deref(), Some("70"));
        assert_eq!(store.get("isOpen").as_deref(), Some("true"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_starts_empty() {
        let path = temp_path("missing");
        let _ = std::fs::remove_file(&path);

        let store = FileSettingsStore::open(&path).unwrap();

        assert_eq!(store.get("sliderValue"), None);
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(FileSettingsStore::open(&path).is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn unchanged_values_are_not_announced() {
        let path = temp_path("announce");
        let _ = std::fs::remove_file(&path);
        let store = FileSettingsStore::open(&path).unwrap();
        let mut listener = store.subscribe();

        store.set("isAuto", "false").unwrap();
        store.set("isAuto", "false").unwrap();

        assert_eq!(listener.recv().await.map(|e| e.key), Some("isAuto".to_owned()));
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(10), listener.recv())
                .await
                .is_err()
        );

        std::fs::remove_file(&path).unwrap();
    }
}
