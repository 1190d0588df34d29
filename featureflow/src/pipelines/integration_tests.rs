//! End-to-end tests of the KDD pipeline on a generated CSV.

#[cfg(test)]
mod tests {
    use crate::components::{kdd_column_names, DatasetStatistics, ANOMALIES_FILE, STATISTICS_FILE};
    use crate::config::PipelineConfig;
    use crate::context::PipelineContext;
    use crate::dataset::{build_dataset, RECORD_FILE_NAME};
    use crate::events::{CollectingEventSink, EventSink};
    use crate::features::{FittedTransformSchema, FITTED_SCHEMA_FILE};
    use crate::pipelines::kdd::{self, EXAMPLE_GEN, EXAMPLE_VALIDATOR, TRAINER, TRANSFORM};
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    const ROWS: usize = 120;

    fn write_kdd_csv(data_root: &Path, poison: bool) {
        let mut body = kdd_column_names().join(",");
        body.push('\n');
        for row in 0..ROWS {
            let mut cells = vec![
                format!("{}", row % 13),
                ["tcp", "udp", "icmp"][row % 3].to_string(),
                ["http", "smtp", "ftp", "private"][row % 4].to_string(),
                if row % 10 == 0 { String::new() } else { "SF".to_string() },
            ];
            cells.extend((1..38).map(|i| format!("{}", (row * i) % 50)));
            cells.push(if row % 4 == 0 { "smurf." } else { "normal." }.to_string());
            if poison && row == 7 {
                cells[5] = "n/a".to_string();
            }
            body.push_str(&cells.join(","));
            body.push('\n');
        }
        std::fs::create_dir_all(data_root).unwrap();
        std::fs::write(data_root.join("kddcup.csv"), body).unwrap();
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig::new()
            .with_data_root(dir.join("data"))
            .with_pipeline_root(dir.join("pipeline"))
            .with_batch_size(40)
    }

    #[tokio::test]
    async fn test_kdd_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_kdd_csv(&config.data_root, false);

        let sink = Arc::new(CollectingEventSink::new());
        let ctx = Arc::new(
            PipelineContext::new(&config.pipeline_name, &config.pipeline_root)
                .with_event_sink(Arc::clone(&sink) as Arc<dyn EventSink>),
        );
        let result = kdd::create_pipeline(&config).unwrap().execute(ctx).await.unwrap();
        assert!(result.success, "{:?}", result.error);

        let root = &config.pipeline_root;
        assert!(root.join(EXAMPLE_GEN).join("train").join(RECORD_FILE_NAME).is_file());
        let stats = DatasetStatistics::load(root.join("statistics").join(STATISTICS_FILE)).unwrap();
        assert_eq!(stats.splits["train"].records + stats.splits["eval"].records, ROWS);
        let anomalies = std::fs::read_to_string(root.join(EXAMPLE_VALIDATOR).join(ANOMALIES_FILE)).unwrap();
        assert_eq!(anomalies.trim(), "[]");

        let trainer = result.output(TRAINER).unwrap();
        let train_records = trainer.get("train_records").and_then(serde_json::Value::as_u64).unwrap();
        let eval_records = trainer.get("eval_records").and_then(serde_json::Value::as_u64).unwrap();
        assert_eq!(train_records + eval_records, ROWS as u64);
        assert_eq!(trainer.get("label_key"), Some(&json!("label_0")));

        // A second consumer of the saved artifact sees the same statistics.
        let fitted = FittedTransformSchema::load(root.join(TRANSFORM).join(FITTED_SCHEMA_FILE)).unwrap();
        let train_file = root.join(TRANSFORM).join("train").join(RECORD_FILE_NAME);
        let first = build_dataset(&[train_file.display().to_string()], &fitted, 40, "label_0")
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(first.features.len(), 41);
        assert!(first.len() <= 40);

        let types = sink.event_types();
        assert_eq!(types.iter().filter(|t| *t == "stage.completed").count(), 5);
        assert_eq!(types.last().map(String::as_str), Some("pipeline.completed"));
    }

    #[test]
    fn test_text_in_numerical_column_stops_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_kdd_csv(&config.data_root, true);

        let graph = kdd::create_pipeline(&config).unwrap();
        let ctx = Arc::new(PipelineContext::new(&config.pipeline_name, &config.pipeline_root));
        let result = tokio_test::block_on(graph.execute(ctx)).unwrap();

        assert!(!result.success);
        let error = result.error.clone().unwrap();
        assert!(error.contains("num_2"), "{error}");
        assert!(result.output(TRAINER).is_none());
    }
}
