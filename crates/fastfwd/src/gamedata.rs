//! Per-build vtable slot table.
//!
//! Vtable layouts shift between engine builds, so the four indices the
//! feature needs are data, not code. A table with holes is legal to load;
//! each consumer demands the slot it needs and fails with the slot's name
//! if this build doesn't provide it.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotTable {
    /// Engine build label this table was made for, for log output only.
    pub build: String,

    /// `IServerGameDLL::RunFrame` in the server interface vtable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_frame: Option<usize>,

    /// `CEngineAPI::Frame` in the eng object vtable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<usize>,

    /// `IEngineTool::GetRealTime` accessor in the tool interface vtable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_real_time: Option<usize>,

    /// `IEngineTool::HostFrameTime` accessor in the tool interface vtable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_frame_time: Option<usize>,
}

fn require(slot: Option<usize>, name: &'static str) -> Result<usize> {
    slot.ok_or(Error::SlotMissing { name })
}

impl SlotTable {
    pub fn run_frame_slot(&self) -> Result<usize> {
        require(self.run_frame, "RunFrame")
    }

    pub fn frame_slot(&self) -> Result<usize> {
        require(self.frame, "Frame")
    }

    pub fn get_real_time_slot(&self) -> Result<usize> {
        require(self.get_real_time, "GetRealTime")
    }

    pub fn host_frame_time_slot(&self) -> Result<usize> {
        require(self.host_frame_time, "HostFrameTime")
    }

    /// Whether every slot the fast-forward feature needs is present.
    pub fn is_complete(&self) -> bool {
        self.run_frame.is_some()
            && self.frame.is_some()
            && self.get_real_time.is_some()
            && self.host_frame_time.is_some()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let table: SlotTable = serde_json::from_str(&fs::read_to_string(path)?)?;
        debug!("loaded slot table for build {:?} from {}", table.build, path.display());
        Ok(table)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_table() -> SlotTable {
        SlotTable {
            build: "4554".to_owned(),
            run_frame: Some(3),
            frame: Some(5),
            get_real_time: Some(19),
            host_frame_time: Some(20),
        }
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slots.json");
        full_table().save(&path).unwrap();

        let loaded = SlotTable::load(&path).unwrap();
        assert_eq!(loaded.build, "4554");
        assert_eq!(loaded.run_frame_slot().unwrap(), 3);
        assert_eq!(loaded.frame_slot().unwrap(), 5);
        assert_eq!(loaded.get_real_time_slot().unwrap(), 19);
        assert_eq!(loaded.host_frame_time_slot().unwrap(), 20);
        assert!(loaded.is_complete());
    }

    #[test]
    fn test_partial_table_loads_but_names_missing_slot() {
        let table: SlotTable =
            serde_json::from_str(r#"{ "build": "5135", "run_frame": 3 }"#).unwrap();
        assert!(!table.is_complete());
        assert_eq!(table.run_frame_slot().unwrap(), 3);
        let err = table.frame_slot().unwrap_err();
        assert!(matches!(err, Error::SlotMissing { name: "Frame" }));
    }

    #[test]
    fn test_save_omits_holes() {
        let table = SlotTable {
            build: "old".to_owned(),
            run_frame: Some(3),
            ..SlotTable::default()
        };
        let json = serde_json::to_string(&table).unwrap();
        assert!(!json.contains("frame_time"));
    }
}
