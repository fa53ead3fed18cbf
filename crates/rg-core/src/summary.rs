//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Power flow summary derived from raw inverter measurements."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;

use rg_common::SummaryProfile;

use crate::types::{RealMeasurement, Summary};

/// Combine unlocalized measurements into a [`Summary`].
///
/// Values that do not parse as numbers are ignored and missing keys count as zero.
pub fn compute(profile: &SummaryProfile, measurements: &[RealMeasurement]) -> Summary {
    let values: HashMap<&str, f64> = measurements
        .iter()
        .filter_map(|m| {
            m.value
                .trim()
                .parse::<f64>()
                .ok()
                .map(|value| (m.i18n_code.as_str(), value))
        })
        .collect();
    let value = |key: &str| values.get(key).copied().unwrap_or_default();

    Summary {
        grid_power: (value(&profile.feed_key) - value(&profile.total_active_power_key))
            * profile.power_scale,
        battery_power: (value(&profile.charge_key) - value(&profile.discharge_key))
            * profile.power_scale,
        pv_power: value(&profile.total_dc_power_key) * profile.power_scale,
        load_power: value(&profile.load_active_power_key) * profile.power_scale,
        battery_level: value(&profile.soc_key) * profile.level_scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(code: &str, value: &str) -> RealMeasurement {
        RealMeasurement {
            i18n_code: code.to_owned(),
            localized_name: code.to_owned(),
            value: value.to_owned(),
            unit: String::new(),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn hybrid_inverter_example() {
        let profile = SummaryProfile::default();
        let summary = compute(
            &profile,
            &[
                measurement("I18N_CONFIG_KEY_4060", "5.00"),
                measurement("I18N_COMMON_FEED_NETWORK_TOTAL_ACTIVE_POWER", "1.00"),
                measurement("I18N_CONFIG_KEY_3921", "2.00"),
                measurement("I18N_CONFIG_KEY_3907", "0.50"),
                measurement("I18N_COMMON_TOTAL_DCPOWER", "3.00"),
                measurement("I18N_COMMON_LOAD_TOTAL_ACTIVE_POWER", "2.50"),
                measurement("I18N_COMMON_BATTERY_SOC", "80.0"),
            ],
        );
        assert!(close(summary.grid_power, 4000.0));
        assert!(close(summary.battery_power, 1500.0));
        assert!(close(summary.pv_power, 3000.0));
        assert!(close(summary.load_power, 2500.0));
        assert!(close(summary.battery_level, 0.8));
    }

    #[test]
    fn missing_and_non_numeric_values_are_zero() {
        let profile = SummaryProfile::default();
        let summary = compute(
            &profile,
            &[
                measurement("I18N_COMMON_TOTAL_DCPOWER", "--"),
                measurement("I18N_CONFIG_KEY_3907", "1.5"),
            ],
        );
        assert_eq!(summary.pv_power, 0.0);
        assert!(close(summary.battery_power, -1500.0));
        assert_eq!(summary.grid_power, 0.0);
        assert_eq!(summary.battery_level, 0.0);
    }

    #[test]
    fn custom_keys_and_scales() {
        let profile = SummaryProfile {
            total_dc_power_key: "PV".into(),
            power_scale: 1.0,
            ..SummaryProfile::default()
        };
        let summary = compute(&profile, &[measurement("PV", " 750 ")]);
        assert!(close(summary.pv_power, 750.0));
    }
}
