use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::warn;

use comfort_common::{
    AirconMode, AppliedAirconSetting, CirculatorSetting, MinRuntimeStore, MinRuntimeTable,
    MinRuntimeTracker, PersistenceError, SettingStore,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    last_aircon: Option<AppliedAirconSetting>,
    #[serde(default)]
    last_circulator: Option<CirculatorSetting>,
    #[serde(default)]
    min_runtime: Option<MinRuntimeTable>,
}

/// `state.json` plus an append-only `history.jsonl` under the data directory.
pub struct JsonFileStore {
    state_path: PathBuf,
    history_path: PathBuf,
    min_runtime_seed: Vec<MinRuntimeTracker>,
}

fn persistence(operation: &'static str) -> impl FnOnce(anyhow::Error) -> PersistenceError {
    move |err| PersistenceError::new(operation, format!("{err:#}"))
}

impl JsonFileStore {
    pub fn new(data_dir: &Path, min_runtime_seed: Vec<MinRuntimeTracker>) -> Self {
        Self {
            state_path: data_dir.join("state.json"),
            history_path: data_dir.join("history.jsonl"),
            min_runtime_seed,
        }
    }

    pub fn from_env(min_runtime_seed: Vec<MinRuntimeTracker>) -> Self {
        let data_dir = std::env::var("COMFORT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.comfort"));
        Self::new(&data_dir, min_runtime_seed)
    }

    fn load_state(&self) -> anyhow::Result<StoredState> {
        match fs::read(&self.state_path) {
            Ok(raw) => serde_json::from_slice::<StoredState>(&raw)
                .with_context(|| format!("parsing {}", self.state_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(StoredState::default()),
            Err(err) => Err(err).with_context(|| format!("reading {}", self.state_path.display())),
        }
    }

    fn save_state(&self, state: &StoredState) -> anyhow::Result<()> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(state)?;
        fs::write(&self.state_path, payload)
            .with_context(|| format!("writing {}", self.state_path.display()))?;
        Ok(())
    }

    fn update_state(&self, update: impl FnOnce(&mut StoredState)) -> anyhow::Result<()> {
        let mut state = self.load_state()?;
        update(&mut state);
        self.save_state(&state)
    }

    fn append_history(&self, applied: &AppliedAirconSetting) -> anyhow::Result<()> {
        if let Some(parent) = self.history_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(applied)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .with_context(|| format!("opening {}", self.history_path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn read_history(&self) -> anyhow::Result<Vec<AppliedAirconSetting>> {
        let raw = match fs::read_to_string(&self.history_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", self.history_path.display()))
            }
        };

        let mut history = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AppliedAirconSetting>(line) {
                Ok(entry) => history.push(entry),
                Err(err) => warn!("skipping history line {}: {err}", index + 1),
            }
        }
        history.sort_by_key(|entry| entry.applied_at);
        Ok(history)
    }

    fn min_runtime_table(&self, state: &StoredState) -> MinRuntimeTable {
        state
            .min_runtime
            .clone()
            .unwrap_or_else(|| MinRuntimeTable::new(self.min_runtime_seed.clone()))
    }
}

/// Entries at or after `since`, led by the latest one before it.
fn history_since(history: Vec<AppliedAirconSetting>, since: i64) -> Vec<AppliedAirconSetting> {
    let first_inside = history.partition_point(|entry| entry.applied_at < since);
    let start = first_inside.saturating_sub(1);
    history.into_iter().skip(start).collect()
}

impl SettingStore for JsonFileStore {
    fn load_last_aircon(&mut self) -> Result<Option<AppliedAirconSetting>, PersistenceError> {
        self.load_state()
            .map(|state| state.last_aircon)
            .map_err(persistence("load last aircon"))
    }

    fn save_aircon(&mut self, applied: &AppliedAirconSetting) -> Result<(), PersistenceError> {
        self.update_state(|state| state.last_aircon = Some(*applied))
            .map_err(persistence("save aircon"))?;
        self.append_history(applied)
            .map_err(persistence("append history"))
    }

    fn aircon_history(&mut self, since: i64) -> Result<Vec<AppliedAirconSetting>, PersistenceError> {
        self.read_history()
            .map(|history| history_since(history, since))
            .map_err(persistence("read history"))
    }

    fn load_last_circulator(&mut self) -> Result<Option<CirculatorSetting>, PersistenceError> {
        self.load_state()
            .map(|state| state.last_circulator)
            .map_err(persistence("load last circulator"))
    }

    fn save_circulator(&mut self, setting: &CirculatorSetting) -> Result<(), PersistenceError> {
        self.update_state(|state| state.last_circulator = Some(*setting))
            .map_err(persistence("save circulator"))
    }
}

impl MinRuntimeStore for JsonFileStore {
    fn find_band(
        &mut self,
        mode: AirconMode,
        temperature: f64,
    ) -> Result<Option<MinRuntimeTracker>, PersistenceError> {
        let state = self.load_state().map_err(persistence("load min runtime"))?;
        self.min_runtime_table(&state).find_band(mode, temperature)
    }

    fn restart_dwell(
        &mut self,
        mode: AirconMode,
        temperature: f64,
        now: DateTime<FixedOffset>,
    ) -> Result<(), PersistenceError> {
        let mut state = self.load_state().map_err(persistence("load min runtime"))?;
        let mut table = self.min_runtime_table(&state);
        table.restart_dwell(mode, temperature, now)?;
        state.min_runtime = Some(table);
        self.save_state(&state).map_err(persistence("save min runtime"))
    }
}
