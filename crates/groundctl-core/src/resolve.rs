// ── Mapping resolver ──
//
// Derives the device records a surface shows from the active mapping
// table. Pure functions: no state, no I/O.

use std::collections::HashSet;

use tracing::warn;

use crate::model::{Configuration, DeviceRecord, MappingEntry};
use crate::stream::{SensorFilter, Surface};

/// Records for every entry on `board_id` (case-insensitive) whose type
/// passes `filter`, in mapping order.
///
/// No configuration yields an empty set. A name that repeats within the
/// matched entries keeps its first occurrence.
pub fn resolve(
    configuration: Option<&Configuration>,
    board_id: &str,
    filter: &SensorFilter,
) -> Vec<DeviceRecord> {
    resolve_matching(configuration, filter, |entry| entry.is_on_board(board_id))
}

/// Like [`resolve`], across every board of the configuration.
pub fn resolve_all_boards(
    configuration: Option<&Configuration>,
    filter: &SensorFilter,
) -> Vec<DeviceRecord> {
    resolve_matching(configuration, filter, |_| true)
}

/// Records for a surface, according to its kind.
pub fn resolve_surface(configuration: Option<&Configuration>, surface: &Surface) -> Vec<DeviceRecord> {
    let Some(filter) = surface.kind.device_filter() else {
        return Vec::new();
    };
    if surface.kind.spans_all_boards() {
        resolve_all_boards(configuration, &filter)
    } else {
        resolve(configuration, &surface.label, &filter)
    }
}

fn resolve_matching(
    configuration: Option<&Configuration>,
    filter: &SensorFilter,
    on_board: impl Fn(&MappingEntry) -> bool,
) -> Vec<DeviceRecord> {
    let Some(configuration) = configuration else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    configuration
        .mappings
        .iter()
        .filter(|entry| filter.matches(entry.sensor_type) && on_board(entry))
        .filter(|entry| {
            let fresh = seen.insert(entry.text_id.clone());
            if !fresh {
                warn!(
                    configuration = %configuration.id,
                    text_id = %entry.text_id,
                    "duplicate mapping name, keeping the first"
                );
            }
            fresh
        })
        .map(DeviceRecord::seed)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Computer, SensorType};
    use crate::stream::SurfaceKind;

    fn entry(text_id: &str, board: &str, sensor_type: SensorType) -> MappingEntry {
        MappingEntry::new(text_id, board, sensor_type, 1, Computer::Flight)
    }

    fn config() -> Configuration {
        Configuration::new(
            "hotfire",
            vec![
                entry("FV01", "sam-01", SensorType::Valve),
                entry("PT01", "sam-01", SensorType::Pt),
                entry("TC01", "SAM-01", SensorType::Tc),
                entry("FV02", "sam-02", SensorType::Valve),
                entry("RAIL", "sam-01", SensorType::Rail24v),
                entry("LC01", "sam-01", SensorType::LoadCell),
            ],
        )
    }

    fn names(records: &[DeviceRecord]) -> Vec<&str> {
        records.iter().map(DeviceRecord::name).collect()
    }

    #[test]
    fn valves_on_one_board() {
        let cfg = config();
        let records = resolve(Some(&cfg), "SAM-01", &SensorFilter::valves());
        assert_eq!(names(&records), vec!["FV01"]);
        assert!(records.iter().all(|r| r.as_valve().is_some()));
    }

    #[test]
    fn sensors_keep_mapping_order() {
        let cfg = config();
        let records = resolve(Some(&cfg), "sam-01", &SensorFilter::sensors());
        assert_eq!(names(&records), vec!["PT01", "TC01", "LC01"]);
    }

    #[test]
    fn output_is_exactly_the_matching_subset() {
        let cfg = config();
        for board in ["sam-01", "sam-02", "sam-03"] {
            for filter in [SensorFilter::valves(), SensorFilter::sensors(), SensorFilter::all()] {
                let records = resolve(Some(&cfg), board, &filter);
                let expected = cfg
                    .mappings
                    .iter()
                    .filter(|m| m.is_on_board(board) && filter.matches(m.sensor_type))
                    .count();
                assert_eq!(records.len(), expected, "board {board}");
            }
        }
    }

    #[test]
    fn no_configuration_is_empty() {
        assert!(resolve(None, "sam-01", &SensorFilter::all()).is_empty());
    }

    #[test]
    fn duplicate_names_keep_first() {
        let cfg = Configuration::new(
            "dup",
            vec![
                entry("PT01", "sam-01", SensorType::Pt),
                entry("PT01", "sam-01", SensorType::Tc),
            ],
        );
        let records = resolve(Some(&cfg), "sam-01", &SensorFilter::sensors());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sensor_type(), SensorType::Pt);
    }

    #[test]
    fn pid_surface_spans_boards() {
        let cfg = config();
        let surface = Surface::new(SurfaceKind::Pid, "main");
        let records = resolve_surface(Some(&cfg), &surface);
        assert_eq!(names(&records), vec!["FV01", "PT01", "TC01", "FV02", "LC01"]);

        let bms = Surface::new(SurfaceKind::Bms, "sam-01");
        assert!(resolve_surface(Some(&cfg), &bms).is_empty());
    }
}
