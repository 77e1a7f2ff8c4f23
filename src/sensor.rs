//! Pure conversions from raw snapshot integers to physical readings.
//!
//! The decoder never scales anything; every fixed-point factor the device
//! uses lives here, as does the charge/discharge/standby classification.

use std::fmt;

use crate::felicity::snapshot::TelemetrySnapshot;

/// Raw cell reading the BMS emits for slots without a cell attached.
pub const CELL_SENTINEL: i64 = 65535;

/// Current magnitude (in amps) at or below which the pack counts as idle.
const IDLE_CURRENT_A: f64 = 0.05;

/// Cell drift above this many volts indicates a balancing problem.
pub const DRIFT_HIGH_V: f64 = 0.03;

/// Fixed-point scale factors used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// raw / 1000 (pack and cell voltages, in mV)
    Milli,
    /// raw / 100 (state of charge)
    Centi,
    /// raw / 10 (currents in dA, temperatures in d°C)
    Deci,
}

impl Scale {
    pub fn apply(&self, raw: i64) -> f64 {
        match self {
            Scale::Milli => raw as f64 / 1000.0,
            Scale::Centi => raw as f64 / 100.0,
            Scale::Deci => raw as f64 / 10.0,
        }
    }
}

/// Everything the presentation layer derives from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Soc,
    Voltage,
    Current,
    Power,
    Temp1,
    Temp2,
    MaxCellVoltage,
    MinCellVoltage,
    CellDrift,
    MaxChargeCurrent,
    MaxDischargeCurrent,
    State,
    Fault,
    Warning,
}

/// How a sensor is computed: a scaled single value at a fixed extraction
/// path, a bare status code, or one of the composite values.
enum SensorSpec {
    Scaled {
        field: &'static str,
        path: &'static [usize],
        scale: Scale,
    },
    Code(&'static str),
    Power,
    Drift,
    State,
}

/// A computed sensor value in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Measurement(f64),
    State(BatteryState),
    Code(i64),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Measurement(v) => write!(f, "{}", v),
            Reading::State(s) => write!(f, "{}", s),
            Reading::Code(c) => write!(f, "{}", c),
        }
    }
}

impl Sensor {
    pub const ALL: [Sensor; 14] = [
        Sensor::Soc,
        Sensor::Voltage,
        Sensor::Current,
        Sensor::Power,
        Sensor::Temp1,
        Sensor::Temp2,
        Sensor::MaxCellVoltage,
        Sensor::MinCellVoltage,
        Sensor::CellDrift,
        Sensor::MaxChargeCurrent,
        Sensor::MaxDischargeCurrent,
        Sensor::State,
        Sensor::Fault,
        Sensor::Warning,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Sensor::Soc => "soc",
            Sensor::Voltage => "voltage",
            Sensor::Current => "current",
            Sensor::Power => "power",
            Sensor::Temp1 => "temp1",
            Sensor::Temp2 => "temp2",
            Sensor::MaxCellVoltage => "max_cell_v",
            Sensor::MinCellVoltage => "min_cell_v",
            Sensor::CellDrift => "cell_drift",
            Sensor::MaxChargeCurrent => "max_charge_current",
            Sensor::MaxDischargeCurrent => "max_discharge_current",
            Sensor::State => "state",
            Sensor::Fault => "fault",
            Sensor::Warning => "warning",
        }
    }

    fn spec(&self) -> SensorSpec {
        use SensorSpec::*;
        match self {
            Sensor::Soc => Scaled { field: "Batsoc", path: &[0, 0], scale: Scale::Centi },
            Sensor::Voltage => Scaled { field: "Batt", path: &[0, 0], scale: Scale::Milli },
            Sensor::Current => Scaled { field: "Batt", path: &[1, 0], scale: Scale::Deci },
            Sensor::Temp1 => Scaled { field: "BTemp", path: &[0, 0], scale: Scale::Deci },
            Sensor::Temp2 => Scaled { field: "BTemp", path: &[0, 1], scale: Scale::Deci },
            Sensor::MaxCellVoltage => Scaled { field: "BMaxMin", path: &[0, 0], scale: Scale::Milli },
            Sensor::MinCellVoltage => Scaled { field: "BMaxMin", path: &[0, 1], scale: Scale::Milli },
            Sensor::MaxChargeCurrent => Scaled { field: "LVolCur", path: &[1, 0], scale: Scale::Deci },
            Sensor::MaxDischargeCurrent => Scaled { field: "LVolCur", path: &[1, 1], scale: Scale::Deci },
            Sensor::Fault => Code("Bfault"),
            Sensor::Warning => Code("Bwarn"),
            Sensor::Power => Power,
            Sensor::CellDrift => Drift,
            Sensor::State => State,
        }
    }

    /// Computes this sensor against a snapshot; `None` when the source
    /// fields are absent.
    pub fn evaluate(&self, snapshot: &TelemetrySnapshot) -> Option<Reading> {
        match self.spec() {
            SensorSpec::Scaled { field, path, scale } => snapshot
                .nested_int(field, path)
                .map(|raw| Reading::Measurement(scale.apply(raw))),
            SensorSpec::Code(field) => snapshot.int(field).map(Reading::Code),
            SensorSpec::Power => {
                let volts = Scale::Milli.apply(snapshot.nested_int("Batt", &[0, 0])?);
                let amps = Scale::Deci.apply(snapshot.nested_int("Batt", &[1, 0])?);
                Some(Reading::Measurement(volts * amps))
            }
            SensorSpec::Drift => {
                let max = snapshot.nested_int("BMaxMin", &[0, 0])?;
                let min = snapshot.nested_int("BMaxMin", &[0, 1])?;
                Some(Reading::Measurement(Scale::Milli.apply(max - min)))
            }
            SensorSpec::State => classify(snapshot).map(Reading::State),
        }
    }
}

/// Evaluates every sensor against a snapshot, skipping ones whose source
/// fields are absent.
pub fn readings(snapshot: &TelemetrySnapshot) -> Vec<(Sensor, Reading)> {
    Sensor::ALL
        .iter()
        .filter_map(|sensor| sensor.evaluate(snapshot).map(|reading| (*sensor, reading)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryState {
    Charging,
    Discharging,
    Standby,
    Full,
    /// Estate code this crate does not know, kept visible for diagnostics.
    Unknown(i64),
}

impl BatteryState {
    /// Estate codes observed across firmware revisions.
    pub fn from_estate(code: i64) -> Option<Self> {
        match code {
            9152 => Some(BatteryState::Charging),
            5056 => Some(BatteryState::Discharging),
            960 => Some(BatteryState::Standby),
            320 => Some(BatteryState::Full),
            _ => None,
        }
    }
}

impl fmt::Display for BatteryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatteryState::Charging => f.write_str("charging"),
            BatteryState::Discharging => f.write_str("discharging"),
            BatteryState::Standby => f.write_str("standby"),
            BatteryState::Full => f.write_str("full"),
            BatteryState::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// Sign heuristic used when the Estate code is missing or unrecognized.
/// Exactly +/-0.05 A still counts as standby.
pub fn classify_current(amps: f64) -> BatteryState {
    if amps > IDLE_CURRENT_A {
        BatteryState::Charging
    } else if amps < -IDLE_CURRENT_A {
        BatteryState::Discharging
    } else {
        BatteryState::Standby
    }
}

/// Charge/discharge/standby classification. A recognized `Estate` code wins
/// over the current-sign heuristic; with neither field present there is
/// nothing to classify.
pub fn classify(snapshot: &TelemetrySnapshot) -> Option<BatteryState> {
    let code = snapshot.int("Estate");
    if let Some(state) = code.and_then(BatteryState::from_estate) {
        return Some(state);
    }
    if let Some(raw) = snapshot.nested_int("Batt", &[1, 0]) {
        return Some(classify_current(Scale::Deci.apply(raw)));
    }
    code.map(BatteryState::Unknown)
}

/// Per-cell voltages from `BatcelList`, sentinel slots dropped.
pub fn cell_voltages(snapshot: &TelemetrySnapshot) -> Vec<i64> {
    snapshot
        .get("BatcelList")
        .and_then(|v| v.get(0))
        .and_then(|v| v.as_array())
        .map(|cells| {
            cells
                .iter()
                .filter_map(|cell| cell.as_i64())
                .filter(|&cell| cell != CELL_SENTINEL)
                .collect()
        })
        .unwrap_or_default()
}

/// Min/max/drift over the per-cell list, sentinel slots excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellStats {
    pub max_raw: i64,
    pub min_raw: i64,
}

impl CellStats {
    pub fn max_volts(&self) -> f64 {
        Scale::Milli.apply(self.max_raw)
    }

    pub fn min_volts(&self) -> f64 {
        Scale::Milli.apply(self.min_raw)
    }

    pub fn drift_raw(&self) -> i64 {
        self.max_raw - self.min_raw
    }

    pub fn drift_volts(&self) -> f64 {
        Scale::Milli.apply(self.drift_raw())
    }

    pub fn drift_high(&self) -> bool {
        self.drift_volts() > DRIFT_HIGH_V
    }
}

pub fn cell_stats(snapshot: &TelemetrySnapshot) -> Option<CellStats> {
    let cells = cell_voltages(snapshot);
    Some(CellStats {
        max_raw: *cells.iter().max()?,
        min_raw: *cells.iter().min()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn snapshot(value: Value) -> TelemetrySnapshot {
        match value {
            Value::Object(map) => TelemetrySnapshot::new(map),
            _ => panic!("test fixture must be an object"),
        }
    }

    #[test]
    fn scales_match_the_device() {
        assert_eq!(Scale::Milli.apply(52100), 52.1);
        assert_eq!(Scale::Deci.apply(-112), -11.2);
        assert_eq!(Scale::Centi.apply(8400), 84.0);
    }

    #[test]
    fn current_threshold_is_inclusive_for_standby() {
        assert_eq!(classify_current(0.05), BatteryState::Standby);
        assert_eq!(classify_current(-0.05), BatteryState::Standby);
        assert_eq!(classify_current(0.0), BatteryState::Standby);
        assert_eq!(classify_current(0.06), BatteryState::Charging);
        assert_eq!(classify_current(-0.06), BatteryState::Discharging);
    }

    #[test]
    fn estate_takes_precedence_over_current_sign() {
        // Positive current, but the device says discharging.
        let snap = snapshot(json!({"Estate": 5056, "Batt": [[52100], [112]]}));
        assert_eq!(classify(&snap), Some(BatteryState::Discharging));

        let snap = snapshot(json!({"Estate": 320}));
        assert_eq!(classify(&snap), Some(BatteryState::Full));
    }

    #[test]
    fn unknown_estate_falls_back_to_current() {
        let snap = snapshot(json!({"Estate": 1234, "Batt": [[52100], [-112]]}));
        assert_eq!(classify(&snap), Some(BatteryState::Discharging));

        let snap = snapshot(json!({"Estate": 1234}));
        assert_eq!(classify(&snap), Some(BatteryState::Unknown(1234)));

        assert_eq!(classify(&snapshot(json!({}))), None);
    }

    #[test]
    fn sentinel_cells_are_excluded() {
        let snap = snapshot(json!({"BatcelList": [[3300, 65535, 3280]]}));
        assert_eq!(cell_voltages(&snap), vec![3300, 3280]);

        let stats = cell_stats(&snap).unwrap();
        assert_eq!(stats.max_raw, 3300);
        assert_eq!(stats.min_raw, 3280);
        assert_eq!(stats.drift_raw(), 20);
        assert_eq!(stats.drift_volts(), 0.02);
        assert!(!stats.drift_high());
    }

    #[test]
    fn all_sentinel_cells_mean_no_stats() {
        let snap = snapshot(json!({"BatcelList": [[65535, 65535]]}));
        assert!(cell_voltages(&snap).is_empty());
        assert!(cell_stats(&snap).is_none());
    }

    #[test]
    fn drift_high_above_30_millivolts() {
        let stats = CellStats { max_raw: 3320, min_raw: 3280 };
        assert!(stats.drift_high());
        let boundary = CellStats { max_raw: 3310, min_raw: 3280 };
        assert!(!boundary.drift_high());
    }

    #[test]
    fn power_is_volts_times_amps() {
        let snap = snapshot(json!({"Batt": [[52100], [-112]]}));
        match Sensor::Power.evaluate(&snap) {
            Some(Reading::Measurement(w)) => assert!((w - (52.1 * -11.2)).abs() < 1e-9),
            other => panic!("unexpected power reading {:?}", other),
        }
    }

    #[test]
    fn absent_fields_evaluate_to_none() {
        let snap = snapshot(json!({"Batsoc": [[8400, 0, 0]]}));
        assert_eq!(Sensor::Voltage.evaluate(&snap), None);
        assert_eq!(Sensor::Temp1.evaluate(&snap), None);
        assert_eq!(
            Sensor::Soc.evaluate(&snap),
            Some(Reading::Measurement(84.0))
        );
    }
}
