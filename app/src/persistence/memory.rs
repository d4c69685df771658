use std::collections::BTreeMap;
use std::sync::Mutex;

use infrastructure::{EventBus, EventListener};

use super::{SettingChanged, SettingsStore};

/// Volatile store, used when no settings file is configured.
pub struct MemorySettingsStore {
    entries: Mutex<BTreeMap<String, String>>,
    events: EventBus<SettingChanged>,
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            events: EventBus::new(32),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let previous = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.insert(key.to_owned(), value.to_owned())
        };

        if previous.as_deref() != Some(value) {
            self.events.emitter().send(SettingChanged {
                key: key.to_owned(),
                value: value.to_owned(),
            });
        }

        Ok(())
    }

    fn subscribe(&self) -> EventListener<SettingChanged> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn subscribers_only_see_changed_values() {
        let store = MemorySettingsStore::default();
        let mut listener = store.subscribe();

        store.set("isOpen", "true").unwrap();
        store.set("isOpen", "true").unwrap();
        store.set("isOpen", "false").unwrap();

        assert_eq!(
            listener.recv().await,
            Some(SettingChanged {
                key: "isOpen".to_owned(),
                value: "true".to_owned()
            })
        );
        assert_eq!(listener.recv().await.map(|e| e.value), Some("false".to_owned()));
        assert!(tokio::time::timeout(Duration::from_millis(10), listener.recv()).await.is_err());
    }
}
