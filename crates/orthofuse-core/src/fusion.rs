//! Area-weighted evidence fusion: combines the per-class confidences of all
//! observations matched to a ground patch into one probability per class.
//!
//! Each observation is an independent noisy detector; fusion is a noisy-OR
//! over the matched evidence, discounted by how much of the observation's own
//! footprint actually overlaps the patch.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{FusionError, Result};

/// How per-class confidences are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMode {
    /// Threshold each score into a boolean detection first, then combine the
    /// covered fractions of the positive detectors.
    Binary,
    /// Noisy-OR over coverage-weighted raw scores.
    Probabilistic,
}

/// One class the upstream model scores, with its binary detection threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub binary_threshold: f64,
}

/// A synonym/aggregate group: member classes are merged (max score, or OR of
/// booleans) into one output class and dropped from the output individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateGroup {
    pub name: String,
    pub members: Vec<String>,
}

/// Explicit class list for fusion. Always passed in and validated up front,
/// never inferred from table columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSchema {
    pub classes: Vec<ClassDef>,
    #[serde(default)]
    pub aggregates: Vec<AggregateGroup>,
}

impl ClassSchema {
    pub fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(FusionError::Configuration(
                "class schema has no classes".into(),
            ));
        }
        let mut seen = HashSet::new();
        for class in &self.classes {
            if !seen.insert(class.name.as_str()) {
                return Err(FusionError::Configuration(format!(
                    "duplicate class '{}' in schema",
                    class.name
                )));
            }
            if !(0.0..=1.0).contains(&class.binary_threshold) {
                return Err(FusionError::Configuration(format!(
                    "binary threshold for '{}' must lie in [0, 1], got {}",
                    class.name, class.binary_threshold
                )));
            }
        }
        let mut grouped = HashSet::new();
        for group in &self.aggregates {
            if seen.contains(group.name.as_str()) {
                return Err(FusionError::Configuration(format!(
                    "aggregate '{}' collides with a class name",
                    group.name
                )));
            }
            if group.members.is_empty() {
                return Err(FusionError::Configuration(format!(
                    "aggregate '{}' has no members",
                    group.name
                )));
            }
            for member in &group.members {
                if !seen.contains(member.as_str()) {
                    return Err(FusionError::Configuration(format!(
                        "aggregate '{}' references unknown class '{}'",
                        group.name, member
                    )));
                }
                if !grouped.insert(member.as_str()) {
                    return Err(FusionError::Configuration(format!(
                        "class '{}' belongs to more than one aggregate",
                        member
                    )));
                }
            }
        }
        Ok(())
    }

    /// Score-column order expected by [`Evidence::scores`].
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|c| c.name.as_str())
    }

    fn class_index(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c.name == name)
    }

    /// The reef survey schema of the original classifier: DinoVdeau class
    /// thresholds, with the algae sub-classes merged into `Algae`.
    pub fn coral_reef() -> Self {
        let classes = [
            ("Acropore_branched", 0.351),
            ("Acropore_digitised", 0.349),
            ("Acropore_sub_massive", 0.123),
            ("Acropore_tabular", 0.415),
            ("Algae_assembly", 0.434),
            ("Algae_drawn_up", 0.193),
            ("Algae_limestone", 0.346),
            ("Algae_sodding", 0.41),
            ("Atra/Leucospilota", 0.586),
            ("Bleached_coral", 0.408),
            ("Blurred", 0.3),
            ("Dead_coral", 0.407),
            ("Fish", 0.466),
            ("Homo_sapiens", 0.402),
            ("Human_object", 0.343),
            ("Living_coral", 0.208),
            ("Millepore", 0.292),
            ("No_acropore_encrusting", 0.227),
            ("No_acropore_foliaceous", 0.462),
            ("No_acropore_massive", 0.333),
            ("No_acropore_solitary", 0.415),
            ("No_acropore_sub_massive", 0.377),
            ("Rock", 0.476),
            ("Sand", 0.548),
            ("Rubble", 0.417),
            ("Sea_cucumber", 0.357),
            ("Sea_urchins", 0.335),
            ("Sponge", 0.152),
            ("Syringodium_isoetifolium", 0.476),
            ("Thalassodendron_ciliatum", 0.209),
            ("Useless", 0.315),
        ];
        Self {
            classes: classes
                .iter()
                .map(|(name, threshold)| ClassDef {
                    name: (*name).to_string(),
                    binary_threshold: *threshold,
                })
                .collect(),
            aggregates: vec![AggregateGroup {
                name: "Algae".to_string(),
                members: [
                    "Algae_assembly",
                    "Algae_drawn_up",
                    "Algae_limestone",
                    "Algae_sodding",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            }],
        }
    }
}

/// One matched (observation, patch) row entering fusion. Scores are aligned
/// with [`ClassSchema::class_names`] order; areas are in square meters of the
/// working CRS.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub scores: Vec<f64>,
    pub intersection_area: f64,
    pub observation_area: f64,
}

impl Evidence {
    /// Fraction of the observation's own footprint overlapping the patch.
    /// `None` when the observation carries no usable area information; such
    /// rows are excluded from fusion entirely rather than treated as zero
    /// confidence.
    pub fn coverage_ratio(&self) -> Option<f64> {
        if !self.observation_area.is_finite()
            || self.observation_area <= 0.0
            || !self.intersection_area.is_finite()
        {
            return None;
        }
        Some((self.intersection_area / self.observation_area).clamp(0.0, 1.0))
    }
}

/// Combines matched evidence into fused per-class probabilities.
pub struct FusionEngine {
    schema: ClassSchema,
    outputs: Vec<OutputClass>,
}

struct OutputClass {
    name: String,
    /// Indices into the schema's class list; one entry for plain classes,
    /// several for an aggregate.
    members: Vec<usize>,
}

impl FusionEngine {
    pub fn new(schema: ClassSchema) -> Result<Self> {
        schema.validate()?;

        let grouped: HashSet<&str> = schema
            .aggregates
            .iter()
            .flat_map(|g| g.members.iter().map(String::as_str))
            .collect();

        let mut outputs: Vec<OutputClass> = schema
            .classes
            .iter()
            .enumerate()
            .filter(|(_, c)| !grouped.contains(c.name.as_str()))
            .map(|(i, c)| OutputClass {
                name: c.name.clone(),
                members: vec![i],
            })
            .collect();
        for group in &schema.aggregates {
            outputs.push(OutputClass {
                name: group.name.clone(),
                members: group
                    .members
                    .iter()
                    .filter_map(|m| schema.class_index(m))
                    .collect(),
            });
        }
        // Deterministic, alphabetic output column order.
        outputs.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self { schema, outputs })
    }

    pub fn schema(&self) -> &ClassSchema {
        &self.schema
    }

    /// Output class names, alphabetically ordered; aggregate members are
    /// replaced by their aggregate.
    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.name.as_str()).collect()
    }

    /// Fuse all evidence matched to one patch. Returns one probability per
    /// output class, in [`FusionEngine::output_names`] order. Order of the
    /// evidence rows does not matter.
    pub fn fuse(&self, evidence: &[Evidence], mode: FusionMode) -> Vec<f64> {
        self.outputs
            .iter()
            .map(|output| match mode {
                FusionMode::Probabilistic => self.fuse_probabilistic(output, evidence),
                FusionMode::Binary => self.fuse_binary(output, evidence),
            })
            .collect()
    }

    /// `P = 1 - prod_i (1 - score_i * ratio_i)`: full-coverage evidence
    /// contributes its raw score, barely-overlapping evidence almost nothing,
    /// and several weak detections compound.
    fn fuse_probabilistic(&self, output: &OutputClass, evidence: &[Evidence]) -> f64 {
        let mut miss = 1.0;
        for ev in evidence {
            let Some(ratio) = ev.coverage_ratio() else {
                continue;
            };
            let score = output
                .members
                .iter()
                .map(|&i| ev.scores.get(i).copied().unwrap_or(f64::NAN))
                .filter(|s| s.is_finite())
                .fold(f64::NEG_INFINITY, f64::max);
            if !score.is_finite() {
                continue;
            }
            miss *= 1.0 - (score.clamp(0.0, 1.0) * ratio);
        }
        1.0 - miss
    }

    /// Positive detections only: `P = 1 - prod_i (1 - ratio_i)`, the chance
    /// that every positive detector's overlap misses the patch. Negative
    /// detections contribute nothing to the product.
    fn fuse_binary(&self, output: &OutputClass, evidence: &[Evidence]) -> f64 {
        let mut miss = 1.0;
        for ev in evidence {
            let Some(ratio) = ev.coverage_ratio() else {
                continue;
            };
            let detected = output.members.iter().any(|&i| {
                let score = ev.scores.get(i).copied().unwrap_or(f64::NAN);
                score.is_finite() && score > self.schema.classes[i].binary_threshold
            });
            if detected {
                miss *= 1.0 - ratio;
            }
        }
        1.0 - miss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn simple_schema() -> ClassSchema {
        ClassSchema {
            classes: vec![
                ClassDef {
                    name: "Fish".into(),
                    binary_threshold: 0.466,
                },
                ClassDef {
                    name: "Sand".into(),
                    binary_threshold: 0.548,
                },
            ],
            aggregates: vec![],
        }
    }

    fn evidence(scores: Vec<f64>, intersection: f64, observation: f64) -> Evidence {
        Evidence {
            scores,
            intersection_area: intersection,
            observation_area: observation,
        }
    }

    #[test]
    fn full_coverage_single_observation_passes_score_through() {
        let engine = FusionEngine::new(simple_schema()).unwrap();
        let fused = engine.fuse(
            &[evidence(vec![0.8, 0.1], 4.0, 4.0)],
            FusionMode::Probabilistic,
        );
        let fish = engine.output_names().iter().position(|n| *n == "Fish").unwrap();
        assert_relative_eq!(fused[fish], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn two_half_confident_observations_compound() {
        let engine = FusionEngine::new(simple_schema()).unwrap();
        let fused = engine.fuse(
            &[
                evidence(vec![0.5, 0.0], 4.0, 4.0),
                evidence(vec![0.5, 0.0], 4.0, 4.0),
            ],
            FusionMode::Probabilistic,
        );
        let fish = engine.output_names().iter().position(|n| *n == "Fish").unwrap();
        assert_relative_eq!(fused[fish], 0.75, epsilon = 1e-12);
    }

    #[test]
    fn binary_mode_uses_covered_fraction_of_positive_detectors() {
        let engine = FusionEngine::new(simple_schema()).unwrap();
        // Fish positive (0.9 > 0.466), 30% of its footprint over the patch.
        let fused = engine.fuse(&[evidence(vec![0.9, 0.1], 0.3, 1.0)], FusionMode::Binary);
        let names = engine.output_names();
        let fish = names.iter().position(|n| *n == "Fish").unwrap();
        let sand = names.iter().position(|n| *n == "Sand").unwrap();
        assert_relative_eq!(fused[fish], 0.3, epsilon = 1e-12);
        // Sand never detected, so nothing enters its product.
        assert_relative_eq!(fused[sand], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn adding_positive_evidence_never_decreases_the_fused_score() {
        let engine = FusionEngine::new(simple_schema()).unwrap();
        let mut rows = vec![evidence(vec![0.4, 0.0], 1.0, 2.0)];
        let fish = engine.output_names().iter().position(|n| *n == "Fish").unwrap();
        let mut last = engine.fuse(&rows, FusionMode::Probabilistic)[fish];
        for _ in 0..5 {
            rows.push(evidence(vec![0.3, 0.0], 0.5, 2.0));
            let next = engine.fuse(&rows, FusionMode::Probabilistic)[fish];
            assert!(next >= last);
            last = next;
        }
    }

    #[test]
    fn zero_or_nan_observation_area_rows_are_excluded() {
        let engine = FusionEngine::new(simple_schema()).unwrap();
        let fish = engine.output_names().iter().position(|n| *n == "Fish").unwrap();
        let fused = engine.fuse(
            &[
                evidence(vec![0.9, 0.0], 1.0, 0.0),
                evidence(vec![0.9, 0.0], 1.0, f64::NAN),
            ],
            FusionMode::Probabilistic,
        );
        // No usable information at all, not "confidently absent".
        assert_relative_eq!(fused[fish], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn aggregate_takes_member_maximum_and_replaces_members() {
        let engine = FusionEngine::new(ClassSchema::coral_reef()).unwrap();
        let names = engine.output_names();
        assert!(names.contains(&"Algae"));
        assert!(!names.contains(&"Algae_sodding"));

        let schema = engine.schema().clone();
        let mut scores = vec![0.0; schema.classes.len()];
        let sodding = schema.class_names().position(|n| n == "Algae_sodding").unwrap();
        let assembly = schema.class_names().position(|n| n == "Algae_assembly").unwrap();
        scores[sodding] = 0.7;
        scores[assembly] = 0.2;

        let fused = engine.fuse(&[evidence(scores, 2.0, 2.0)], FusionMode::Probabilistic);
        let algae = names.iter().position(|n| *n == "Algae").unwrap();
        assert_relative_eq!(fused[algae], 0.7, epsilon = 1e-12);
    }

    #[test]
    fn output_names_are_alphabetical() {
        let engine = FusionEngine::new(ClassSchema::coral_reef()).unwrap();
        let names = engine.output_names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn schema_validation_rejects_bad_input() {
        let mut schema = simple_schema();
        schema.aggregates.push(AggregateGroup {
            name: "Benthos".into(),
            members: vec!["Missing".into()],
        });
        assert!(schema.validate().is_err());

        let mut dup = simple_schema();
        dup.classes.push(ClassDef {
            name: "Fish".into(),
            binary_threshold: 0.5,
        });
        assert!(dup.validate().is_err());

        let mut bad_threshold = simple_schema();
        bad_threshold.classes[0].binary_threshold = 1.5;
        assert!(bad_threshold.validate().is_err());
    }
}
