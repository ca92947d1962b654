//! Snapshot metadata and per-domain aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tensor::EnergyMap;
use crate::metrics::ThermodynamicMetrics;
use crate::METADATA_SCHEMA_VERSION;

fn current_schema_version() -> String {
    METADATA_SCHEMA_VERSION.to_string()
}

/// Immutable summary of one stored energy map.
///
/// Written as the `<map_id>_metadata.json` sidecar and mirrored to the
/// metadata graph. `regime` and `confidence` are produced by downstream
/// classifiers and carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyMapMetadata {
    /// Sidecar schema version. Records written before versioning read as current.
    #[serde(default = "current_schema_version")]
    pub schema_version: String,
    /// Map identifier (file stem).
    pub map_id: String,
    /// Owning domain.
    pub domain: String,
    /// Resolved scale, `max(height, width)`.
    pub scale: u32,
    /// When this record was computed.
    pub timestamp: DateTime<Utc>,
    /// Mean cell energy.
    #[serde(with = "float_repr")]
    pub energy_mean: f64,
    /// Population variance of cell energy.
    #[serde(with = "float_repr")]
    pub energy_var: f64,
    /// Shannon entropy in nats.
    #[serde(with = "float_repr")]
    pub entropy: f64,
    /// Mean gradient magnitude.
    #[serde(with = "float_repr")]
    pub gradient_magnitude_mean: f64,
    /// Maximum gradient magnitude.
    #[serde(with = "float_repr")]
    pub gradient_magnitude_max: f64,
    /// Regime label assigned downstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime: Option<String>,
    /// Confidence of the regime label.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "float_repr::option")]
    pub confidence: Option<f64>,
}

impl EnergyMapMetadata {
    /// Compute metadata for a map, timestamped now.
    pub fn compute(map: &EnergyMap, map_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self::compute_at(map, map_id, domain, Utc::now())
    }

    /// Compute metadata with an explicit timestamp.
    pub fn compute_at(
        map: &EnergyMap,
        map_id: impl Into<String>,
        domain: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let summary = ThermodynamicMetrics::summarize(map);
        Self {
            schema_version: current_schema_version(),
            map_id: map_id.into(),
            domain: domain.into(),
            scale: map.scale() as u32,
            timestamp,
            energy_mean: summary.mean,
            energy_var: summary.variance,
            entropy: summary.entropy,
            gradient_magnitude_mean: summary.gradient_magnitude_mean,
            gradient_magnitude_max: summary.gradient_magnitude_max,
            regime: None,
            confidence: None,
        }
    }

    /// Attach a regime label.
    pub fn with_regime(mut self, regime: impl Into<String>, confidence: f64) -> Self {
        self.regime = Some(regime.into());
        self.confidence = Some(confidence);
        self
    }

    /// Take over the regime fields of an earlier record.
    pub fn carry_regime_from(mut self, previous: &EnergyMapMetadata) -> Self {
        if self.regime.is_none() {
            self.regime = previous.regime.clone();
        }
        if self.confidence.is_none() {
            self.confidence = previous.confidence;
        }
        self
    }
}

/// Aggregate statistics over a domain.
///
/// `Empty` serializes to `{}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainStats {
    /// At least one map was found.
    Populated(DomainAggregate),
    /// The domain holds no maps.
    Empty {},
}

impl DomainStats {
    /// Whether no maps contributed.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty {})
    }

    /// The aggregate, if any.
    pub fn aggregate(&self) -> Option<&DomainAggregate> {
        match self {
            Self::Populated(agg) => Some(agg),
            Self::Empty {} => None,
        }
    }

    /// Aggregate per-map metadata records.
    pub fn from_metadata(records: &[EnergyMapMetadata]) -> Self {
        if records.is_empty() {
            return Self::Empty {};
        }
        let energies: Vec<f64> = records.iter().map(|m| m.energy_mean).collect();
        let entropies: Vec<f64> = records.iter().map(|m| m.entropy).collect();
        let (energy_mean, energy_std) = mean_std(&energies);
        let (entropy_mean, entropy_std) = mean_std(&entropies);
        Self::Populated(DomainAggregate {
            count: records.len(),
            energy_mean,
            energy_std,
            entropy_mean,
            entropy_std,
        })
    }
}

/// Mean and population standard deviation of per-map summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainAggregate {
    /// Number of maps.
    pub count: usize,
    /// Mean of per-map mean energy.
    pub energy_mean: f64,
    /// Standard deviation of per-map mean energy.
    pub energy_std: f64,
    /// Mean of per-map entropy.
    pub entropy_mean: f64,
    /// Standard deviation of per-map entropy.
    pub entropy_std: f64,
}

/// JSON has no NaN or infinity. Non-finite floats are written as the
/// strings `"NaN"`, `"Infinity"` and `"-Infinity"` and read back from them.
mod float_repr {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    fn from_repr<E: de::Error>(repr: Repr) -> Result<f64, E> {
        match repr {
            Repr::Number(v) => Ok(v),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &"a number")),
            },
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "Infinity" } else { "-Infinity" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        from_repr(Repr::deserialize(deserializer)?)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
            Option::<super::Repr>::deserialize(deserializer)?
                .map(super::from_repr)
                .transpose()
        }
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_scale_and_mean() {
        let map = EnergyMap::filled(64, 96, 2.0);
        let meta = EnergyMapMetadata::compute(&map, "m1", "solar");
        assert_eq!(meta.scale, 96);
        assert!((meta.energy_mean - 2.0).abs() < 1e-12);
        assert!(meta.energy_var.abs() < 1e-12);
        assert_eq!(meta.gradient_magnitude_max, 0.0);
    }

    #[test]
    fn test_regime_fields_absent_from_json() {
        let map = EnergyMap::filled(64, 64, 1.0);
        let meta = EnergyMapMetadata::compute(&map, "m1", "solar");
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("regime").is_none());
        assert!(json.get("confidence").is_none());
        assert!(json["timestamp"].is_string());

        let labelled = meta.with_regime("turbulent", 0.9);
        let json = serde_json::to_value(&labelled).unwrap();
        assert_eq!(json["regime"], "turbulent");
    }

    #[test]
    fn test_carry_regime() {
        let map = EnergyMap::filled(64, 64, 1.0);
        let old = EnergyMapMetadata::compute(&map, "m1", "solar").with_regime("calm", 0.5);
        let fresh = EnergyMapMetadata::compute(&map, "m1", "solar").carry_regime_from(&old);
        assert_eq!(fresh.regime.as_deref(), Some("calm"));
        assert_eq!(fresh.confidence, Some(0.5));
    }

    #[test]
    fn test_empty_stats_serialize_as_empty_object() {
        let stats = DomainStats::from_metadata(&[]);
        assert!(stats.is_empty());
        assert_eq!(serde_json::to_string(&stats).unwrap(), "{}");
    }

    #[test]
    fn test_stats_population_std() {
        let a = EnergyMapMetadata::compute(&EnergyMap::filled(64, 64, 1.0), "a", "d");
        let b = EnergyMapMetadata::compute(&EnergyMap::filled(64, 64, 3.0), "b", "d");
        let stats = DomainStats::from_metadata(&[a, b]);
        let agg = stats.aggregate().unwrap();
        assert_eq!(agg.count, 2);
        assert!((agg.energy_mean - 2.0).abs() < 1e-12);
        assert!((agg.energy_std - 1.0).abs() < 1e-12);
        assert!(agg.entropy_std.abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_metrics_survive_json() {
        let map = EnergyMap::filled(64, 64, 1.0);
        let mut meta = EnergyMapMetadata::compute(&map, "m1", "solar").with_regime("calm", 0.5);
        meta.entropy = f64::NAN;
        meta.gradient_magnitude_max = f64::INFINITY;
        meta.energy_var = f64::NEG_INFINITY;

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["entropy"], "NaN");
        assert_eq!(json["gradient_magnitude_max"], "Infinity");
        assert_eq!(json["energy_var"], "-Infinity");

        let back: EnergyMapMetadata = serde_json::from_value(json).unwrap();
        assert!(back.entropy.is_nan());
        assert_eq!(back.gradient_magnitude_max, f64::INFINITY);
        assert_eq!(back.energy_var, f64::NEG_INFINITY);
        assert_eq!(back.regime.as_deref(), Some("calm"));
        assert_eq!(back.confidence, Some(0.5));
    }

    #[test]
    fn test_unknown_float_text_is_rejected() {
        let map = EnergyMap::filled(64, 64, 1.0);
        let mut json = serde_json::to_value(EnergyMapMetadata::compute(&map, "m1", "solar")).unwrap();
        json["entropy"] = serde_json::json!("lots");
        assert!(serde_json::from_value::<EnergyMapMetadata>(json).is_err());
    }

    #[test]
    fn test_schema_version_written_and_defaulted() {
        let map = EnergyMap::filled(64, 64, 1.0);
        let mut json = serde_json::to_value(EnergyMapMetadata::compute(&map, "m1", "solar")).unwrap();
        assert_eq!(json["schema_version"], METADATA_SCHEMA_VERSION);

        json.as_object_mut().unwrap().remove("schema_version");
        let back: EnergyMapMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back.schema_version, METADATA_SCHEMA_VERSION);
    }
}
