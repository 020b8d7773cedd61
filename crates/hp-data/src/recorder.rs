use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use hp_types::{
    Configuration, HpResult, Observation, RecordError, RunId, SearchSpace, TrialIndex,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Column holding the objective value; one row per completed trial.
pub const LOSS_COLUMN: &str = "loss";

const DELIMITER: u8 = b',';
const QUOTE: u8 = b'\'';

/// Appends per-parameter values and losses to CSV files, one directory per run.
///
/// Layout: `<root>/<model>/<number:03>/<name>.csv`, each row `trial_index,value`.
#[derive(Debug)]
pub struct EvaluationRecorder {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl EvaluationRecorder {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run: &RunId) -> PathBuf {
        self.root.join(run.dir_fragment())
    }

    fn column_path(&self, run: &RunId, name: &str) -> PathBuf {
        self.run_dir(run).join(format!("{name}.csv"))
    }

    pub fn ensure_run_dir(&self, run: &RunId) -> HpResult<PathBuf> {
        let dir = self.run_dir(run);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Remove every log file of `run`. A run without logs is left as is.
    pub fn clear_run(&self, run: &RunId) -> HpResult<()> {
        let dir = self.run_dir(run);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            info!(run = %run, path = %dir.display(), "removed previous evaluation logs");
        }
        Ok(())
    }

    /// Persist one completed trial.
    ///
    /// Parameter rows are written before the loss row, so a loss row implies
    /// the whole record is on disk.
    pub fn record(
        &self,
        run: &RunId,
        trial_index: TrialIndex,
        config: &Configuration,
        loss: f64,
    ) -> HpResult<()> {
        if config.contains_key(LOSS_COLUMN) {
            return Err(hp_types::validation_error!(
                "parameter name {LOSS_COLUMN:?} is reserved for the objective"
            ));
        }

        let _guard = self.write_lock.lock();
        self.ensure_run_dir(run)?;

        let mut names: Vec<&String> = config.keys().collect();
        names.sort();
        for name in names {
            let value = config[name].to_string();
            append_row(&self.column_path(run, name), trial_index, &value)?;
        }
        append_row(
            &self.column_path(run, LOSS_COLUMN),
            trial_index,
            &loss.to_string(),
        )?;

        debug!(run = %run, trial_index, loss, "recorded evaluation");
        Ok(())
    }

    /// Persist a `NaN` loss for a trial that ended without recording a result.
    ///
    /// The row keeps the failed trial counted, so a resumed run never reissues
    /// its index. A trial that already has a loss row is left as is.
    pub fn record_failure(&self, run: &RunId, trial_index: TrialIndex) -> HpResult<()> {
        let _guard = self.write_lock.lock();
        let path = self.column_path(run, LOSS_COLUMN);

        let recorded = read_column(&path, |_| Some(()))?;
        if recorded.iter().any(|(index, _)| *index == trial_index) {
            debug!(run = %run, trial_index, "failed trial already has a loss row");
            return Ok(());
        }

        self.ensure_run_dir(run)?;
        append_row(&path, trial_index, &f64::NAN.to_string())?;
        debug!(run = %run, trial_index, "recorded failed trial");
        Ok(())
    }

    /// Number of trials already used by `run`, failed ones included.
    ///
    /// A missing log means a fresh run; an unreadable one is logged and also
    /// treated as zero.
    pub fn record_count(&self, run: &RunId) -> usize {
        let path = self.column_path(run, LOSS_COLUMN);
        if !path.is_file() {
            return 0;
        }

        match count_rows(&path) {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    run = %run,
                    path = %path.display(),
                    error = %e,
                    "evaluation log unreadable, starting from zero"
                );
                0
            }
        }
    }

    /// Read back every completed trial of `run` for the parameters in `space`.
    ///
    /// Observations come back in trial order. Trials missing a value for any
    /// parameter, and trial indices written more than once to any column, are
    /// skipped.
    pub fn load_history(&self, run: &RunId, space: &SearchSpace) -> HpResult<Vec<Observation>> {
        let loss_path = self.column_path(run, LOSS_COLUMN);
        let losses = index_rows(
            read_column(&loss_path, |cell| cell.trim().parse::<f64>().ok())?,
            &loss_path,
        );
        if losses.is_empty() {
            return Ok(Vec::new());
        }

        let mut columns: HashMap<&str, HashMap<TrialIndex, _>> = HashMap::new();
        for def in &space.parameters {
            let path = self.column_path(run, &def.name);
            let column = read_column(&path, |cell| def.parse_value(cell))?;
            columns.insert(def.name.as_str(), index_rows(column, &path));
        }

        let mut indices: Vec<TrialIndex> = losses.keys().copied().collect();
        indices.sort_unstable();

        let mut history = Vec::with_capacity(indices.len());
        'rows: for trial_index in indices {
            let loss = losses[&trial_index];
            let mut config = Configuration::with_capacity(space.len());
            for def in &space.parameters {
                match columns.get(def.name.as_str()).and_then(|c| c.get(&trial_index)) {
                    Some(value) => {
                        config.insert(def.name.clone(), value.clone());
                    }
                    None => {
                        debug!(trial_index, parameter = %def.name, "incomplete record, skipping");
                        continue 'rows;
                    }
                }
            }
            history.push(Observation {
                trial_index,
                config,
                loss,
            });
        }

        Ok(history)
    }
}

fn append_row(path: &Path, trial_index: TrialIndex, value: &str) -> HpResult<()> {
    let write_err = |e: &dyn std::fmt::Display| RecordError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| write_err(&e))?;

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .delimiter(DELIMITER)
        .quote(QUOTE)
        .from_writer(file);
    writer
        .write_record([trial_index.to_string().as_str(), value])
        .map_err(|e| write_err(&e))?;
    writer.flush().map_err(|e| write_err(&e))?;
    Ok(())
}

/// Key rows by trial index, dropping every index that appears more than once.
fn index_rows<T>(rows: Vec<(TrialIndex, T)>, path: &Path) -> HashMap<TrialIndex, T> {
    let mut by_index = HashMap::with_capacity(rows.len());
    let mut duplicated = HashSet::new();
    for (trial_index, value) in rows {
        if by_index.insert(trial_index, value).is_some() {
            duplicated.insert(trial_index);
        }
    }

    for trial_index in duplicated {
        warn!(
            trial_index,
            path = %path.display(),
            "trial index recorded more than once, ignoring it"
        );
        by_index.remove(&trial_index);
    }
    by_index
}

fn reader_for(path: &Path) -> Result<csv::Reader<std::fs::File>, csv::Error> {
    ReaderBuilder::new()
        .has_headers(false)
        .delimiter(DELIMITER)
        .quote(QUOTE)
        .flexible(true)
        .from_path(path)
}

fn count_rows(path: &Path) -> Result<usize, csv::Error> {
    let mut rdr = reader_for(path)?;
    let mut n = 0;
    for record in rdr.records() {
        record?;
        n += 1;
    }
    Ok(n)
}

/// Parse `trial_index,value` rows, skipping malformed ones.
fn read_column<T>(
    path: &Path,
    parse: impl Fn(&str) -> Option<T>,
) -> HpResult<Vec<(TrialIndex, T)>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let mut rdr = reader_for(path).map_err(|e| RecordError::Unreadable {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut rows = Vec::new();
    for (line_num, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| RecordError::Parse {
            path: path.display().to_string(),
            line: line_num + 1,
            message: e.to_string(),
        })?;

        let index = record.get(0).and_then(|c| c.trim().parse::<TrialIndex>().ok());
        let value = record.get(1).and_then(&parse);
        match index.zip(value) {
            Some(row) => rows.push(row),
            None => {
                warn!(
                    "Skipping invalid record at line {} of {}",
                    line_num + 1,
                    path.display()
                );
            }
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hp_types::ParameterValue;
    use std::io::Write;
    use tempfile::tempdir;

    fn space() -> SearchSpace {
        SearchSpace::new()
            .add_int("batch_size", 32, 256)
            .and_then(|s| s.add_log_float("lr", 1e-4, 1.0))
            .and_then(|s| {
                s.add_choice(
                    "nesterov",
                    vec![serde_json::json!("True"), serde_json::json!("False")],
                )
            })
            .unwrap()
    }

    fn config(batch: i64, lr: f64, nesterov: &str) -> Configuration {
        let mut c = Configuration::new();
        c.insert("batch_size".into(), ParameterValue::Int(batch));
        c.insert("lr".into(), ParameterValue::Float(lr));
        c.insert(
            "nesterov".into(),
            ParameterValue::Json(serde_json::json!(nesterov)),
        );
        c
    }

    #[test]
    fn missing_log_counts_zero() {
        let dir = tempdir().unwrap();
        let recorder = EvaluationRecorder::new(dir.path());
        assert_eq!(recorder.record_count(&RunId::new("cnn", 0)), 0);
    }

    #[test]
    fn corrupt_log_counts_zero() {
        let dir = tempdir().unwrap();
        let recorder = EvaluationRecorder::new(dir.path());
        let run = RunId::new("cnn", 1);
        let run_dir = recorder.ensure_run_dir(&run).unwrap();

        let mut file = std::fs::File::create(run_dir.join("loss.csv")).unwrap();
        file.write_all(b"0,0.5\n1,\xff\xfe\n").unwrap();

        assert_eq!(recorder.record_count(&run), 0);
    }

    #[test]
    fn record_then_count_and_layout() {
        let dir = tempdir().unwrap();
        let recorder = EvaluationRecorder::new(dir.path());
        let run = RunId::new("cnn", 7);

        recorder.record(&run, 0, &config(64, 0.01, "True"), 0.9).unwrap();
        recorder.record(&run, 1, &config(128, 0.001, "False"), 0.7).unwrap();

        assert_eq!(recorder.record_count(&run), 2);
        let run_dir = dir.path().join("cnn").join("007");
        for name in ["batch_size", "lr", "nesterov", "loss"] {
            assert!(run_dir.join(format!("{name}.csv")).is_file(), "{name}.csv missing");
        }

        let loss = std::fs::read_to_string(run_dir.join("loss.csv")).unwrap();
        assert_eq!(loss, "0,0.9\n1,0.7\n");
    }

    #[test]
    fn history_round_trips_configurations() {
        let dir = tempdir().unwrap();
        let recorder = EvaluationRecorder::new(dir.path());
        let run = RunId::new("cnn", 2);
        let space = space();

        recorder.record(&run, 0, &config(64, 0.01, "True"), 0.9).unwrap();
        recorder.record(&run, 1, &config(200, 0.25, "False"), 0.4).unwrap();

        let history = recorder.load_history(&run, &space).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].trial_index, 0);
        assert_eq!(history[0].config, config(64, 0.01, "True"));
        assert_eq!(history[1].loss, 0.4);
        assert_eq!(history[1].config, config(200, 0.25, "False"));
    }

    #[test]
    fn history_skips_incomplete_records() {
        let dir = tempdir().unwrap();
        let recorder = EvaluationRecorder::new(dir.path());
        let run = RunId::new("cnn", 3);
        let space = space();

        recorder.record(&run, 0, &config(64, 0.01, "True"), 0.9).unwrap();
        // Loss row without parameter rows.
        append_row(&recorder.column_path(&run, LOSS_COLUMN), 1, "0.3").unwrap();

        let history = recorder.load_history(&run, &space).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(recorder.record_count(&run), 2);
    }

    #[test]
    fn failed_trial_keeps_its_index_counted() {
        let dir = tempdir().unwrap();
        let recorder = EvaluationRecorder::new(dir.path());
        let run = RunId::new("cnn", 5);
        let space = space();

        recorder.record(&run, 0, &config(64, 0.01, "True"), 0.9).unwrap();
        recorder.record_failure(&run, 1).unwrap();
        assert_eq!(recorder.record_count(&run), 2);

        // A trial that already wrote its loss is not counted twice.
        recorder.record_failure(&run, 0).unwrap();
        assert_eq!(recorder.record_count(&run), 2);

        let history = recorder.load_history(&run, &space).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].trial_index, 0);
    }

    #[test]
    fn duplicated_indices_are_dropped_from_history() {
        let dir = tempdir().unwrap();
        let recorder = EvaluationRecorder::new(dir.path());
        let run = RunId::new("cnn", 6);
        let space = space();

        recorder.record(&run, 0, &config(64, 0.01, "True"), 0.9).unwrap();
        recorder.record(&run, 1, &config(128, 0.1, "True"), 0.5).unwrap();
        recorder.record(&run, 1, &config(32, 0.5, "False"), 0.2).unwrap();
        recorder.record(&run, 2, &config(200, 0.2, "False"), 0.4).unwrap();

        let history = recorder.load_history(&run, &space).unwrap();
        let indices: Vec<_> = history.iter().map(|o| o.trial_index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(history[1].config, config(200, 0.2, "False"));
    }

    #[test]
    fn history_of_unknown_run_is_empty() {
        let dir = tempdir().unwrap();
        let recorder = EvaluationRecorder::new(dir.path());
        let history = recorder.load_history(&RunId::new("none", 0), &space()).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn reserved_loss_name_rejected() {
        let dir = tempdir().unwrap();
        let recorder = EvaluationRecorder::new(dir.path());
        let mut c = Configuration::new();
        c.insert("loss".into(), ParameterValue::Float(1.0));
        assert!(recorder.record(&RunId::new("cnn", 0), 0, &c, 1.0).is_err());
    }

    #[test]
    fn clear_run_removes_logs() {
        let dir = tempdir().unwrap();
        let recorder = EvaluationRecorder::new(dir.path());
        let run = RunId::new("cnn", 4);

        recorder.record(&run, 0, &config(64, 0.01, "True"), 0.9).unwrap();
        assert_eq!(recorder.record_count(&run), 1);

        recorder.clear_run(&run).unwrap();
        assert_eq!(recorder.record_count(&run), 0);
        recorder.clear_run(&run).unwrap();
    }
}
