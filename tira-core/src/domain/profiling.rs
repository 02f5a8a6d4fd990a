//! Resource telemetry samples
//!
//! One sample per line in `parsed_profiling.jsonl`.

use serde::{Deserialize, Serialize};

/// Fixed vocabulary of profiling keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilingKey {
    ElapsedTime,
    PsCpu,
    PsRss,
    PsVsz,
    GpuMemoryUsed,
    GpuUtilization,
}

/// Sampled value, numeric for process metrics and raw text for GPU metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfilingValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingSample {
    /// Seconds since the start of the run
    pub timestamp: f64,
    pub key: ProfilingKey,
    pub value: ProfilingValue,
}

impl ProfilingSample {
    pub fn number(timestamp: f64, key: ProfilingKey, value: f64) -> Self {
        Self {
            timestamp,
            key,
            value: ProfilingValue::Number(value),
        }
    }

    pub fn text(timestamp: f64, key: ProfilingKey, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            key,
            value: ProfilingValue::Text(value.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_json_shape() {
        let sample = ProfilingSample::number(3.0, ProfilingKey::PsRss, 49800.0);
        assert_eq!(
            serde_json::to_string(&sample).unwrap(),
            r#"{"timestamp":3.0,"key":"ps_rss","value":49800.0}"#
        );

        let gpu = ProfilingSample::text(0.0, ProfilingKey::GpuUtilization, "0 %");
        assert_eq!(
            serde_json::to_string(&gpu).unwrap(),
            r#"{"timestamp":0.0,"key":"gpu_utilization","value":"0 %"}"#
        );
    }
}
