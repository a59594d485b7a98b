use ndarray::Array2;
use noiseq::filter::{FilterConfig, FilterMethod};
use noiseq::noise::SimulationConfig;
use noiseq::normalization::{NormalizationMethod, RpkmConfig, UpperQuartileConfig};
use noiseq::{
    de::BioConfig, Direction, ExpressionMatrix, FactorAssignment, FeatureAnnotation, FeatureInfo,
    NoiseqError, Pipeline, PipelineConfig, ReplicateMode, Selection,
};

fn ids(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}{}", prefix, i)).collect()
}

fn jitter(i: usize, j: usize) -> f64 {
    ((i * 7919 + j * 104_729) % 1000) as f64 / 500.0 - 1.0
}

fn conditions(samples: &[String], per_condition: usize) -> FactorAssignment {
    let labels = (0..samples.len())
        .map(|j| if j < per_condition { "A" } else { "B" }.to_string())
        .collect();
    FactorAssignment::new(samples.to_vec())
        .unwrap()
        .with_factor("condition", labels)
        .unwrap()
}

/// 40 steady background features plus `stable` (flat) and `shifted` (up ~20x in B), 4 vs 4.
fn scenario() -> (ExpressionMatrix, FactorAssignment) {
    let mut rows: Vec<Vec<f64>> = (0..40)
        .map(|i| {
            let base = 20.0 + ((i * 37) % 400) as f64;
            (0..8).map(|j| (base * (1.0 + 0.08 * jitter(i, j))).round()).collect()
        })
        .collect();
    rows.push(vec![100.0, 102.0, 98.0, 101.0, 100.0, 99.0, 103.0, 100.0]);
    rows.push(vec![10.0, 12.0, 9.0, 11.0, 200.0, 210.0, 195.0, 205.0]);

    let mut features = ids("bg", 40);
    features.push("stable".to_string());
    features.push("shifted".to_string());
    let samples = ids("s", 8);
    let matrix = ExpressionMatrix::from_rows(features, samples.clone(), &rows).unwrap();
    (matrix, conditions(&samples, 4))
}

#[cfg(test)]
mod technical_replicates {
    use super::*;

    #[test]
    fn stable_feature_is_not_called() {
        let (matrix, factors) = scenario();
        let table = Pipeline::new(&matrix, &factors, None, PipelineConfig::new("condition"))
            .unwrap()
            .run()
            .unwrap();

        let stable = table.get("stable").unwrap();
        println!("stable: M = {}, D = {}, prob = {}", stable.m, stable.d, stable.prob);
        assert!(stable.prob < 0.5);
        assert!(stable.m.abs() < 0.2);
    }

    #[test]
    fn shifted_feature_is_called() {
        let (matrix, factors) = scenario();
        let table = Pipeline::new(&matrix, &factors, None, PipelineConfig::new("condition"))
            .unwrap()
            .run()
            .unwrap();

        let shifted = table.get("shifted").unwrap();
        assert!(shifted.prob >= 0.8);
        assert!(shifted.m < -3.0);
        assert!(shifted.ranking > 0.0);

        // 12 within-condition pairs over 42 features
        assert_eq!(table.metadata().noise_size, Some(504));
        assert_eq!(table.metadata().replicate_mode, "technical");

        let down = Selection {
            direction: Direction::Down,
            ..Default::default()
        };
        let called = table.degenes(0.8, &down).unwrap();
        assert!(called.iter().any(|r| r.feature_id == "shifted"));
        assert!(called.iter().all(|r| r.m < 0.0));
        assert!(table.degenes(0.8, &Selection { direction: Direction::Up, ..Default::default() })
            .unwrap()
            .iter()
            .all(|r| r.feature_id != "shifted"));
    }

    #[test]
    fn swapping_levels_flips_the_sign() {
        let (matrix, factors) = scenario();
        let run = |a: &str, b: &str| {
            let config = PipelineConfig::new("condition").with_levels(a, b);
            Pipeline::new(&matrix, &factors, None, config).unwrap().run().unwrap()
        };
        let forward = run("A", "B");
        let reverse = run("B", "A");

        assert_eq!(reverse.metadata().comparison, "B_vs_A");
        let (f, r) = (forward.get("shifted").unwrap(), reverse.get("shifted").unwrap());
        assert!((f.m + r.m).abs() < 1e-9);
        assert!((f.d + r.d).abs() < 1e-9);
    }

    #[test]
    fn annotation_and_filter_flow_into_the_table() {
        let (matrix, factors) = scenario();
        let mut counts = matrix.counts().clone();
        counts.row_mut(3).fill(0.0);
        let matrix =
            ExpressionMatrix::new(matrix.features().to_vec(), matrix.samples().to_vec(), counts)
                .unwrap();

        let lengths: Vec<f64> =
            (0..matrix.n_features()).map(|i| 500.0 + 100.0 * i as f64).collect();
        let mut annotation = FeatureAnnotation::from_lengths(matrix.features(), &lengths).unwrap();
        annotation
            .insert(
                "shifted",
                FeatureInfo {
                    length: Some(4600.0),
                    biotype: Some("lncRNA".to_string()),
                    chromosome: Some("chr2".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let config = PipelineConfig::new("condition")
            .with_normalization(NormalizationMethod::Rpkm(RpkmConfig::default()))
            .with_filter(FilterConfig::with_method(FilterMethod::Cpm));
        let table = Pipeline::new(&matrix, &factors, Some(&annotation), config)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(table.metadata().normalization, "rpkm");
        assert_eq!(table.metadata().n_filtered, 1);
        assert!(table.get("bg3").is_none());
        assert_eq!(table.len(), matrix.n_features() - 1);

        let shifted = table.get("shifted").unwrap();
        assert_eq!(shifted.length, Some(4600.0));
        assert_eq!(shifted.biotype.as_deref(), Some("lncRNA"));
        assert_eq!(shifted.chromosome.as_deref(), Some("chr2"));
        assert!(shifted.prob >= 0.8);
    }
}

#[cfg(test)]
mod simulated_replicates {
    use super::*;

    /// One sample per condition, taken from the 4 vs 4 scenario.
    fn unreplicated() -> (ExpressionMatrix, FactorAssignment) {
        let (matrix, _) = scenario();
        let single = matrix.select_samples(&[0, 4]).unwrap();
        let factors = conditions(single.samples(), 1);
        (single, factors)
    }

    #[test]
    fn shifted_feature_is_called_without_replicates() {
        let (matrix, factors) = unreplicated();
        let config = PipelineConfig::new("condition")
            .with_mode(ReplicateMode::TechnicalSimulated(SimulationConfig::default()));
        let table = Pipeline::new(&matrix, &factors, None, config).unwrap().run().unwrap();

        let meta = table.metadata();
        assert_eq!(meta.replicate_mode, "simulated");
        assert_eq!(meta.q, 0.9);
        // 5 pseudo-replicates per condition: 10 pairs each, 42 features
        assert_eq!(meta.noise_size, Some(840));

        let shifted = table.get("shifted").unwrap();
        println!("simulated: shifted prob = {}", shifted.prob);
        assert!(shifted.prob >= 0.9);
        assert!(table.get("stable").unwrap().prob < 0.5);
    }

    #[test]
    fn length_corrected_simulation_matches_the_statistic() {
        let (matrix, factors) = unreplicated();
        let mut lengths: Vec<f64> =
            (0..matrix.n_features()).map(|i| 500.0 + 100.0 * i as f64).collect();
        lengths[41] = 1000.0;
        let annotation = FeatureAnnotation::from_lengths(matrix.features(), &lengths).unwrap();

        let config = PipelineConfig::new("condition")
            .with_normalization(NormalizationMethod::Rpkm(RpkmConfig::default()))
            .with_mode(ReplicateMode::TechnicalSimulated(SimulationConfig::default()));
        let table = Pipeline::new(&matrix, &factors, Some(&annotation), config)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(table.metadata().normalization, "rpkm");
        assert_eq!(table.metadata().noise_size, Some(840));
        let shifted = table.get("shifted").unwrap();
        let stable = table.get("stable").unwrap();
        println!("rpkm simulated: shifted {}, stable {}", shifted.prob, stable.prob);
        assert!(shifted.prob >= 0.9);
        assert!(stable.prob < 0.5);
    }

    #[test]
    fn seeded_simulation_is_reproducible() {
        let (matrix, factors) = unreplicated();
        let config = PipelineConfig::new("condition").with_mode(ReplicateMode::TechnicalSimulated(
            SimulationConfig {
                seed: 7,
                ..Default::default()
            },
        ));
        let first = Pipeline::new(&matrix, &factors, None, config.clone()).unwrap().run().unwrap();
        let second = Pipeline::new(&matrix, &factors, None, config).unwrap().run().unwrap();
        assert_eq!(first.rows(), second.rows());
    }

    #[test]
    fn real_replicates_required_otherwise() {
        let (matrix, factors) = unreplicated();
        assert!(matches!(
            Pipeline::new(&matrix, &factors, None, PipelineConfig::new("condition")),
            Err(NoiseqError::InsufficientReplicates { .. })
        ));
    }
}

#[cfg(test)]
mod biological_replicates {
    use super::*;

    /// 200 features over 3 vs 3 samples; the first 20 are eight times higher in B.
    fn replicated() -> (ExpressionMatrix, FactorAssignment) {
        let data = Array2::from_shape_fn((200, 6), |(i, j)| {
            let base = 50.0 + (i % 13) as f64 * 20.0;
            let fold = if i < 20 && j >= 3 { 8.0 } else { 1.0 };
            (base * fold * (1.0 + 0.15 * jitter(i, j))).round()
        });
        let samples = ids("s", 6);
        let matrix = ExpressionMatrix::new(ids("g", 200), samples.clone(), data).unwrap();
        (matrix, conditions(&samples, 3))
    }

    #[test]
    fn changed_features_rank_first() {
        let (matrix, factors) = replicated();
        let config = PipelineConfig::new("condition")
            .with_mode(ReplicateMode::Biological(BioConfig::default()));
        let table = Pipeline::new(&matrix, &factors, None, config).unwrap().run().unwrap();

        let meta = table.metadata();
        assert_eq!(meta.replicate_mode, "biological");
        assert_eq!(meta.q, 0.95);
        assert!(meta.noise_size.is_none());
        let p0 = meta.p0.unwrap();
        assert!(p0 > 0.0 && p0 <= 1.0);
        assert!(meta.a0_m.unwrap() > 0.0 && meta.a0_d.unwrap() > 0.0);

        let rows = table.rows();
        assert!(rows.iter().all(|r| r.theta.is_some() && (0.0..=1.0).contains(&r.prob)));
        let changed = rows[..20].iter().map(|r| r.prob).sum::<f64>() / 20.0;
        let unchanged = rows[20..].iter().map(|r| r.prob).sum::<f64>() / 180.0;
        println!("mean prob: changed {}, unchanged {}, p0 {}", changed, unchanged, p0);
        assert!(changed > 0.75);
        assert!(changed - unchanged > 0.3);

        let top = table.degenes(0.0, &Selection::default()).unwrap();
        let hits = top[..20]
            .iter()
            .filter(|r| r.feature_id[1..].parse::<usize>().unwrap() < 20)
            .count();
        assert!(hits >= 16, "only {} of the top 20 are changed features", hits);
    }

    #[test]
    fn single_sample_condition_is_rejected_up_front() {
        let (matrix, _) = replicated();
        let labels = ["A", "B", "B", "B", "B", "B"].iter().map(|s| s.to_string()).collect();
        let factors = FactorAssignment::new(ids("s", 6))
            .unwrap()
            .with_factor("condition", labels)
            .unwrap();
        let config = PipelineConfig::new("condition")
            .with_mode(ReplicateMode::Biological(BioConfig::default()));

        match Pipeline::new(&matrix, &factors, None, config) {
            Err(NoiseqError::InsufficientReplicates { condition, found, required }) => {
                assert_eq!(condition, "A");
                assert_eq!(found, 1);
                assert_eq!(required, 2);
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}

#[cfg(test)]
mod degenerate_inputs {
    use super::*;

    #[test]
    fn upper_quartile_needs_enough_expressed_features() {
        // s1 has only three non-zero counts
        let rows = vec![
            vec![10.0, 5.0, 12.0, 11.0],
            vec![20.0, 0.0, 18.0, 22.0],
            vec![30.0, 7.0, 33.0, 29.0],
            vec![40.0, 0.0, 41.0, 38.0],
            vec![50.0, 9.0, 47.0, 52.0],
            vec![60.0, 0.0, 61.0, 58.0],
        ];
        let samples = ids("s", 4);
        let matrix = ExpressionMatrix::from_rows(ids("g", 6), samples.clone(), &rows).unwrap();
        let factors = conditions(&samples, 2);
        let config = PipelineConfig::new("condition")
            .with_normalization(NormalizationMethod::UpperQuartile(UpperQuartileConfig::default()));

        match Pipeline::new(&matrix, &factors, None, config).unwrap().run() {
            Err(NoiseqError::DegenerateNormalization { sample, .. }) => assert_eq!(sample, "s1"),
            other => panic!("unexpected {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn rpkm_without_lengths_is_rejected() {
        let (matrix, factors) = scenario();
        let config = PipelineConfig::new("condition")
            .with_normalization(NormalizationMethod::Rpkm(RpkmConfig::default()));
        assert!(matches!(
            Pipeline::new(&matrix, &factors, None, config),
            Err(NoiseqError::MissingAnnotation { .. })
        ));
    }
}
