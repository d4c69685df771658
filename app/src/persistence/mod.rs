mod file;
mod memory;

pub use file::FileSettingsStore;
pub use memory::MemorySettingsStore;

use infrastructure::EventListener;

use crate::core::unit::{OpeningPercentage, TargetTemperature};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChanged {
    pub key: String,
    pub value: String,
}

/// String-keyed, string-valued storage for the control panel settings. Writes are
/// last-write-wins, every changed value is announced to subscribers.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    fn subscribe(&self) -> EventListener<SettingChanged>;

    fn set_many(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    TargetTemp,
    SliderValue,
    IsOpen,
    IsAuto,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::TargetTemp => "targetTemp",
            SettingKey::SliderValue => "sliderValue",
            SettingKey::IsOpen => "isOpen",
            SettingKey::IsAuto => "isAuto",
        }
    }
}

/// Snapshot of the control state that survives restarts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PersistedSettings {
    pub opening: OpeningPercentage,
    pub is_open: bool,
    pub is_auto: bool,
    pub target: Option<TargetTemperature>,
}

impl PersistedSettings {
    pub fn load(store: &dyn SettingsStore) -> Self {
        let opening = read(store, SettingKey::SliderValue, |v| {
            v.parse::<f64>().ok().map(OpeningPercentage::from_f64)
        })
        .unwrap_or_default();

        let is_open = read(store, SettingKey::IsOpen, |v| v.parse::<bool>().ok()).unwrap_or(false);
        let is_auto = read(store, SettingKey::IsAuto, |v| v.parse::<bool>().ok()).unwrap_or(false);

        let target = match store.get(SettingKey::TargetTemp.as_str()) {
            Some(v) if v.is_empty() || v == "null" => None,
            Some(v) => {
                let parsed = v.parse::<f64>().ok().and_then(TargetTemperature::new);
                if parsed.is_none() {
                    tracing::warn!("Ignoring invalid persisted target temperature {:?}", v);
                }
                parsed
            }
            None => None,
        };

        let mut settings = Self {
            opening,
            is_open,
            is_auto,
            target,
        };
        settings.repair();
        settings
    }

    pub fn save(&self, store: &dyn SettingsStore) -> anyhow::Result<()> {
        let target = self.target.map(|t| t.celsius().0.to_string()).unwrap_or_default();

        store.set_many(&[
            (SettingKey::TargetTemp.as_str(), target),
            (SettingKey::SliderValue.as_str(), self.opening.value().to_string()),
            (SettingKey::IsOpen.as_str(), self.is_open.to_string()),
            (SettingKey::IsAuto.as_str(), self.is_auto.to_string()),
        ])
    }

    fn repair(&mut self) {
        if self.is_auto && self.target.is_none() {
            tracing::warn!("Persisted auto mode without target temperature, disabling auto mode");
            self.is_auto = false;
        }

        if self.is_open != self.opening.is_open() {
            tracing::debug!(
                "Persisted open flag {} does not match opening {}, deriving it from opening",
                self.is_open,
                self.opening
            );
            self.is_open = self.opening.is_open();
        }
    }
}

fn read<T>(store: &dyn SettingsStore, key: SettingKey, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = store.get(key.as_str())?;
    let parsed = parse(raw.trim());

    if parsed.is_none() {
        tracing::warn!("Ignoring invalid persisted value {:?} for {}", raw, key.as_str());
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_restores_opening_and_open_flag() {
        let store = MemorySettingsStore::default();
        let settings = PersistedSettings {
            opening: OpeningPercentage::new(70),
            is_open: true,
            is_auto: false,
            target: None,
        };

        settings.save(&store).unwrap();

        assert_eq!(store.get("sliderValue").as_deref(), Some("70"));
        assert_eq!(store.get("isOpen").as_deref(), Some("true"));
        assert_eq!(store.get("isAuto").as_deref(), Some("false"));
        assert_eq!(store.get("targetTemp").as_deref(), Some(""));
        assert_eq!(PersistedSettings::load(&store), settings);
    }

    #[test]
    fn target_is_written_as_plain_number() {
        let store = MemorySettingsStore::default();
        let settings = PersistedSettings {
            target: TargetTemperature::new(20.5),
            is_auto: true,
            ..Default::default()
        };

        settings.save(&store).unwrap();

        assert_eq!(store.get("targetTemp").as_deref(), Some("20.5"));
        assert_eq!(PersistedSettings::load(&store).target, TargetTemperature::new(20.5));
    }

    #[test]
    fn empty_store_loads_defaults() {
        let store = MemorySettingsStore::default();

        assert_eq!(PersistedSettings::load(&store), PersistedSettings::default());
    }

    #[test]
    fn auto_without_target_is_repaired() {
        let store = MemorySettingsStore::default();
        store.set("isAuto", "true").unwrap();
        store.set("targetTemp", "").unwrap();

        assert!(!PersistedSettings::load(&store).is_auto);
    }

    #[test]
    fn garbage_values_fall_back_to_defaults() {
        let store = MemorySettingsStore::default();
        store.set("sliderValue", "wide open").unwrap();
        store.set("isOpen", "yes").unwrap();
        store.set("targetTemp", "99").unwrap();

        let settings = PersistedSettings::load(&store);

        assert_eq!(settings.opening, OpeningPercentage::CLOSED);
        assert!(!settings.is_open);
        assert_eq!(settings.target, None);
    }

    #[test]
    fn open_flag_follows_opening() {
        let store = MemorySettingsStore::default();
        store.set("sliderValue", "40").unwrap();
        store.set("isOpen", "false").unwrap();

        let settings = PersistedSettings::load(&store);

        assert_eq!(settings.opening, OpeningPercentage::new(40));
        assert!(settings.is_open);
    }
}
