//! Tables written to Parquet read back with the same content.

use arrow::array::AsArray;
use arrow::datatypes::{Float64Type, UInt32Type};
use mr_common::{
    CausalTestKind, CausalTestResult, CellOutcome, ColumnData, Direction, FeatureMatrix,
    PosteriorMatrix, RegimeSequence, SkipReason,
};
use mr_tables::{
    causality_results_batch, list_table_files, read_parquet_batches, read_table, write_table,
    RegimeRows, TableName,
};

fn regime_rows_fixture() -> (FeatureMatrix, RegimeSequence, PosteriorMatrix) {
    let features = FeatureMatrix::new(
        vec!["pc1".into(), "pc2".into()],
        vec![100, 200, 300, 50],
        vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8],
        &[3, 1],
    )
    .unwrap();
    let labels = RegimeSequence::new(2, vec![1, 1, 0, 0]).unwrap();
    let posteriors =
        PosteriorMatrix::new(2, vec![0.1, 0.9, 0.3, 0.7, 0.6, 0.4, 1.0, 0.0]).unwrap();
    (features, labels, posteriors)
}

#[test]
fn regime_rows_round_trip_through_parquet() {
    let dir = tempfile::tempdir().unwrap();
    let (features, labels, posteriors) = regime_rows_fixture();
    let batch = RegimeRows {
        run_id: "run-000000000001",
        instrument: Some("ES"),
        features: &features,
        labels: &labels,
        posteriors: &posteriors,
    }
    .to_batch()
    .unwrap();

    let path = write_table(dir.path(), TableName::RegimeRows, "run-000000000001", batch).unwrap();
    let (_, batches) = read_parquet_batches(&path).unwrap();
    assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 4);

    let back = &batches[0];
    let regime = back.column_by_name("regime").unwrap().as_primitive::<UInt32Type>();
    assert_eq!(regime.values().to_vec(), vec![1, 1, 0, 0]);
    let pc2 = back.column_by_name("pc2").unwrap().as_primitive::<Float64Type>();
    assert_eq!(pc2.value(3), 0.8);

    // The same file is also a valid feature-table input.
    let raw = read_table(&path).unwrap();
    assert_eq!(
        raw.require("timestamp_ns").unwrap().data,
        ColumnData::Int(vec![100, 200, 300, 50])
    );
    assert_eq!(
        raw.require("segment").unwrap().data,
        ColumnData::Int(vec![0, 0, 0, 1])
    );
}

#[test]
fn causality_results_keep_skipped_cells() {
    let dir = tempfile::tempdir().unwrap();
    let results = vec![
        CausalTestResult {
            test: CausalTestKind::Cmi,
            direction: Direction::TargetToSource,
            source: "NQ".into(),
            target: "ES".into(),
            source_column: "regime".into(),
            target_column: "regime".into(),
            lag: 3,
            outcome: CellOutcome::Computed {
                statistic: 0.004,
                p_value: 0.02,
                df: None,
            },
        },
        CausalTestResult {
            test: CausalTestKind::Granger,
            direction: Direction::SourceToTarget,
            source: "ES".into(),
            target: "NQ".into(),
            source_column: "posterior_0".into(),
            target_column: "posterior_1".into(),
            lag: 1,
            outcome: CellOutcome::skipped(SkipReason::ConstantSeries, "target never varies"),
        },
    ];
    let batch = causality_results_batch("run-x", &results).unwrap();
    write_table(dir.path(), TableName::CausalityResults, "run-x", batch).unwrap();

    let files = list_table_files(dir.path(), TableName::CausalityResults).unwrap();
    assert_eq!(files.len(), 1);
    let table = read_table(&files[0]).unwrap();
    assert_eq!(table.n_rows(), 2);
    match &table.require("status").unwrap().data {
        ColumnData::Text(v) => assert_eq!(v, &["computed".to_string(), "skipped".to_string()]),
        other => panic!("unexpected {other:?}"),
    }
    match &table.require("p_value").unwrap().data {
        ColumnData::Float(v) => {
            assert_eq!(v[0], 0.02);
            assert!(v[1].is_nan());
        }
        other => panic!("unexpected {other:?}"),
    }
}
