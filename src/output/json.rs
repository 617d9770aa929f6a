use anyhow::Result;
use serde::Serialize;

/// Pretty-print any report value (drift list, config dump) for machine
/// consumption; drift variants serialize as snake_case tags.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::DeploymentVersionInfo;
    use crate::version::Drift;

    #[test]
    fn drift_values_serialize_as_snake_case_tags() {
        let entry = DeploymentVersionInfo {
            deployed_version: "2.3.0".to_string(),
            observed_at: Utc.with_ymd_and_hms(2026, 8, 20, 0, 0, 0).unwrap(),
            drift: Drift::Behind(2),
        };
        let rendered = render_json(&entry).expect("render");
        assert!(rendered.contains("\"behind\": 2"));

        let unknown = DeploymentVersionInfo {
            drift: Drift::Unknown,
            ..entry
        };
        assert!(render_json(&unknown).expect("render").contains("\"unknown\""));
    }
}
