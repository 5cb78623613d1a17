use crate::{rating::ImpactCategory, similarity::CopyOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Human-readable meaning of each rating step, per impact category.
/// Reference material only. Scoring never reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMatrixConfig {
    pub impact_descriptions: BTreeMap<ImpactCategory, BTreeMap<u8, String>>,
    pub likelihood_descriptions: BTreeMap<u8, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Skip matches that have no causes, consequences or safeguards.
    #[serde(default = "default_true")]
    pub require_content: bool,
    /// Cap on returned matches; `None` returns all.
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Flags used when a copy request leaves them out.
    #[serde(default)]
    pub default_copy: CopyOptions,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct HazopConfig {
    pub risk_matrix: RiskMatrixConfig,
    pub similarity: SimilarityConfig,
}

impl HazopConfig {
    /// Load from the data/ directory.
    /// In tests, use HazopConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let matrix_path = format!("{data_dir}/risk_matrix.json");
        let matrix_content = std::fs::read_to_string(&matrix_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {matrix_path}: {e}"))?;
        let risk_matrix: RiskMatrixConfig = serde_json::from_str(&matrix_content)?;

        for category in ImpactCategory::ALL {
            let steps = risk_matrix.impact_descriptions.get(&category);
            if steps.map_or(true, |s| s.len() != 5) {
                anyhow::bail!(
                    "{matrix_path}: {} needs descriptions for ratings 1-5",
                    category.field_name()
                );
            }
        }

        let similarity_path = format!("{data_dir}/similarity.json");
        let similarity = match std::fs::read_to_string(&similarity_path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("{similarity_path} not found, using default similarity policy");
                Self::default_similarity()
            }
            Err(e) => anyhow::bail!("Cannot read {similarity_path}: {e}"),
        };

        Ok(Self { risk_matrix, similarity })
    }

    fn default_similarity() -> SimilarityConfig {
        SimilarityConfig {
            require_content: true,
            max_results: None,
            default_copy: CopyOptions::default(),
        }
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        let steps = |labels: [&str; 5]| -> BTreeMap<u8, String> {
            labels
                .iter()
                .enumerate()
                .map(|(i, l)| (i as u8 + 1, (*l).to_string()))
                .collect()
        };
        let impact_descriptions = [
            (ImpactCategory::Safety, steps([
                "Minor: First aid treatment only",
                "Limited: Medical treatment required",
                "Moderate: Single or multiple lost time injuries",
                "Significant: Permanent disablement",
                "Major/Critical: Single or multiple fatalities",
            ])),
            (ImpactCategory::Financial, steps([
                "Minor: <$10K",
                "Limited: $10K-$100K",
                "Moderate: $100K-$1M",
                "Significant: $1M-$10M",
                "Major: >$10M",
            ])),
            (ImpactCategory::Environmental, steps([
                "Minor: Contained spill, no environmental impact",
                "Limited: Minor spill affecting immediate area",
                "Moderate: Localized environmental impact",
                "Significant: Substantial environmental impact",
                "Major/Critical: Major environmental catastrophe",
            ])),
            (ImpactCategory::Reputation, steps([
                "Minor: Local awareness",
                "Limited: Regional awareness",
                "Moderate: National awareness",
                "Significant: International awareness",
                "Major/Critical: Severe long-term damage",
            ])),
            (ImpactCategory::Schedule, steps([
                "Minor: <1 day delay",
                "Limited: 1-7 days delay",
                "Moderate: 1-4 weeks delay",
                "Significant: 1-3 months delay",
                "Major: >3 months delay",
            ])),
            (ImpactCategory::Performance, steps([
                "Minor: <5% degradation",
                "Limited: 5-15% degradation",
                "Moderate: 15-30% degradation",
                "Significant: 30-50% degradation",
                "Major: >50% degradation or shutdown",
            ])),
        ]
        .into_iter()
        .collect();

        Self {
            risk_matrix: RiskMatrixConfig {
                impact_descriptions,
                likelihood_descriptions: steps([
                    "Very Unlikely",
                    "Unlikely",
                    "Possible",
                    "Highly Likely",
                    "Probable",
                ]),
            },
            similarity: Self::default_similarity(),
        }
    }
}
