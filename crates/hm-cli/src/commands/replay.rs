//! Replay command: feeds a host script through the engine.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hm_core::{EnrichedSink, JsonLinesSink, TelemetrySink, TracingSink};

use crate::simulate::{self, ReplaySummary, Simulation};
use crate::{Config, OutputFormat};

/// Builds the record sink for `format`, enriched if configured.
fn build_sink(
    format: OutputFormat,
    output: Option<&Path>,
    config: &Config,
) -> Result<Arc<dyn TelemetrySink>> {
    let records: Arc<dyn TelemetrySink> = match format {
        OutputFormat::Log => Arc::new(TracingSink),
        OutputFormat::Json => {
            let writer: Box<dyn Write + Send> = match output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path)
                        .with_context(|| format!("failed to create {}", path.display()))?,
                )),
                None => Box::new(std::io::stdout()),
            };
            Arc::new(JsonLinesSink::new(writer))
        }
    };

    if config.telemetry.enrich {
        Ok(Arc::new(EnrichedSink::for_host(records, &config.telemetry.host)))
    } else {
        Ok(records)
    }
}

pub fn run(
    script: &Path,
    output: Option<&Path>,
    start: Option<DateTime<Utc>>,
    format: OutputFormat,
    config: &Config,
) -> Result<ReplaySummary> {
    let file =
        File::open(script).with_context(|| format!("failed to open {}", script.display()))?;
    let lines = simulate::parse_script(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", script.display()))?;

    let sink = build_sink(format, output, config)?;
    let simulation = Simulation::new(config.events.clone(), sink, start.unwrap_or_else(Utc::now));
    let summary = simulation.run(&lines)?;

    tracing::info!(
        steps = summary.steps,
        polls = summary.polls,
        duration_secs = summary.duration.as_secs(),
        "replay complete"
    );
    if summary.leaked_subscriptions > 0 {
        tracing::warn!(
            leaked = summary.leaked_subscriptions,
            "subscriptions left behind after shutdown"
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    use hm_core::Category;

    #[test]
    fn replay_writes_records_to_output_file() {
        let temp = tempfile::tempdir().unwrap();
        let script = temp.path().join("session.jsonl");
        let output = temp.path().join("records.jsonl");
        std::fs::write(
            &script,
            concat!(
                r#"{"at": 0, "event": "application_initialized"}"#,
                "\n",
                r#"{"at": 2, "event": "file_exported", "path": "C:/models/A.proj", "format": "DWG", "file": "C:/out/A.dwg"}"#,
                "\n",
            ),
        )
        .unwrap();

        let mut config = Config::default();
        config.events.set(Category::Initialization, true);
        config.events.set(Category::Exporting, true);
        config.telemetry.host.version = Some("2025".to_string());

        let summary = run(&script, Some(&output), None, OutputFormat::Json, &config).unwrap();
        assert_eq!(summary.steps, 2);

        let written = std::fs::read_to_string(&output).unwrap();
        let records: Vec<serde_json::Value> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["template"], "Application Initialized");
        assert_eq!(records[1]["template"], "File Exported");
        assert_eq!(records[1]["fields"]["FileFormat"], "DWG");
        assert_eq!(records[1]["fields"]["hostVersion"], "2025");
        assert!(records[1]["fields"]["machineName"].is_string());
    }

    #[test]
    fn missing_script_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = run(
            &temp.path().join("absent.jsonl"),
            None,
            None,
            OutputFormat::Log,
            &Config::default(),
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("failed to open"));
    }
}
