use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::daemon::{DaemonClient, DaemonHandle, StatusReport};
use crate::domain::{MigrationKind, ProcessStatus, SampleCode};
use crate::error::MigrateError;
use crate::fs_util::list_files_any;
use crate::metadata::FieldRules;
use crate::sheet::{SheetExtractionResult, extract_workbook};
use crate::store::{LegacyStore, TargetStore, TargetTx};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dir: Option<std::path::PathBuf>,
    pub recursive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub kind: MigrationKind,
    pub process_id: String,
    pub status: ProcessStatus,
    pub total: u64,
    pub processed: u64,
    pub not_processed: u64,
    pub items: Vec<ItemResult>,
    pub errors: Vec<ItemError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    pub source: String,
    pub id: i64,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

/// Drives one migration run: reads the legacy side (database or files),
/// writes the target store and keeps the status daemon informed.
pub struct Migrator<D: DaemonClient> {
    legacy: Option<LegacyStore>,
    target: TargetStore,
    daemon: D,
    rules: FieldRules,
}

impl<D: DaemonClient> Migrator<D> {
    pub fn new(legacy: Option<LegacyStore>, target: TargetStore, daemon: D, rules: FieldRules) -> Self {
        Self {
            legacy,
            target,
            daemon,
            rules,
        }
    }

    pub fn target(&self) -> &TargetStore {
        &self.target
    }

    pub fn daemon(&self) -> &D {
        &self.daemon
    }

    pub fn run(
        &mut self,
        kind: MigrationKind,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, MigrateError> {
        let dir = || {
            options
                .dir
                .as_deref()
                .ok_or_else(|| MigrateError::ConfigMissingValue(format!("--dir for {kind}")))
        };
        match kind {
            MigrationKind::Projects => self.migrate_projects(sink),
            MigrationKind::Subjects => self.migrate_subjects(sink),
            MigrationKind::Cgh => self.migrate_cgh(dir()?, options.recursive, sink),
            MigrationKind::Vcf => self.register_vcf(dir()?, options.recursive, sink),
        }
    }

    pub fn migrate_projects(&mut self, sink: &dyn ProgressSink) -> Result<RunSummary, MigrateError> {
        emit(sink, "phase=Scan; reading legacy projects");
        let projects = self.legacy()?.projects()?;
        let mut run = Run::start(
            &self.daemon,
            MigrationKind::Projects,
            vec!["projects".to_string()],
            projects.len(),
        )?;

        let tx = self.target.transaction()?;
        for project in &projects {
            let new_id = match tx.insert_project(project) {
                Ok(id) => id,
                Err(err) => return Err(run.abort(&self.daemon, err)),
            };
            emit(sink, format!("phase=Insert; project {} -> {new_id}", project.id));
            run.processed(&self.daemon, format!("projects/{}", project.id), new_id, 1)?;
        }
        if let Err(err) = tx.commit() {
            return Err(run.abort(&self.daemon, err));
        }

        run.finish(&self.daemon, sink)
    }

    /// Copies subjects whose project has already been migrated; the others
    /// are reported as not processed.
    pub fn migrate_subjects(&mut self, sink: &dyn ProgressSink) -> Result<RunSummary, MigrateError> {
        emit(sink, "phase=Scan; reading legacy subjects");
        let subjects = self.legacy()?.subjects()?;
        let mut run = Run::start(
            &self.daemon,
            MigrationKind::Subjects,
            vec!["subjects".to_string()],
            subjects.len(),
        )?;

        let tx = self.target.transaction()?;
        for subject in &subjects {
            let source = format!("subjects/{}", subject.id);
            let project_id = match subject.project_id {
                Some(legacy_project) => match tx.project_id_for_legacy(legacy_project) {
                    Ok(found) => found,
                    Err(err) => return Err(run.abort(&self.daemon, err)),
                },
                None => None,
            };
            let Some(project_id) = project_id else {
                tracing::warn!(subject = subject.id, project = ?subject.project_id, "project not migrated");
                let project = subject
                    .project_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "<none>".to_string());
                run.not_processed(
                    &self.daemon,
                    source,
                    format!(
                        "project {project} of subject {} has not been migrated",
                        subject.code
                    ),
                )?;
                continue;
            };
            let new_id = match tx.insert_subject(subject, project_id) {
                Ok(id) => id,
                Err(err) => return Err(run.abort(&self.daemon, err)),
            };
            emit(sink, format!("phase=Insert; subject {} -> {new_id}", subject.id));
            run.processed(&self.daemon, source, new_id, 1)?;
        }
        if let Err(err) = tx.commit() {
            return Err(run.abort(&self.daemon, err));
        }

        run.finish(&self.daemon, sink)
    }

    /// Extracts every aberration workbook under `dir` and stores each one in
    /// its own transaction. A file that cannot be extracted or inserted is
    /// recorded and skipped; the file's transaction commits only after the
    /// daemon has accepted the status update.
    pub fn migrate_cgh(
        &mut self,
        dir: &Path,
        recursive: bool,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, MigrateError> {
        emit(sink, format!("phase=Scan; listing {}", dir.display()));
        let files = list_files_any(dir, MigrationKind::Cgh.extensions(), recursive)?;
        let mut run = Run::start(
            &self.daemon,
            MigrationKind::Cgh,
            files.iter().map(|path| path.to_string()).collect(),
            files.len(),
        )?;

        for file in &files {
            emit(sink, format!("phase=Extract; {file}"));
            let start = Instant::now();
            let result = match extract_workbook(file.as_std_path(), &self.rules) {
                Ok(result) => result,
                Err(err) => {
                    run.skipped(&self.daemon, file.as_str(), &err)?;
                    continue;
                }
            };
            let (tx, sample_id) = match stage_sheet(&mut self.target, &result, file.as_str()) {
                Ok(staged) => staged,
                Err(err) => {
                    run.skipped(&self.daemon, file.as_str(), &err)?;
                    continue;
                }
            };
            run.processed(&self.daemon, file.to_string(), sample_id, result.cnv_records.len())?;
            if let Err(err) = tx.commit() {
                return Err(run.abort(&self.daemon, err));
            }
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Insert; sample {} ({} records)",
                    result.sample_code,
                    result.cnv_records.len()
                ),
                elapsed: Some(start.elapsed()),
            });
        }

        run.finish(&self.daemon, sink)
    }

    /// Records every VCF under `dir` as a genomic file of its sample.
    pub fn register_vcf(
        &mut self,
        dir: &Path,
        recursive: bool,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, MigrateError> {
        emit(sink, format!("phase=Scan; listing {}", dir.display()));
        let files = list_files_any(dir, MigrationKind::Vcf.extensions(), recursive)?;
        let mut run = Run::start(
            &self.daemon,
            MigrationKind::Vcf,
            files.iter().map(|path| path.to_string()).collect(),
            files.len(),
        )?;

        for file in &files {
            let code = match SampleCode::from_path(file.as_std_path()) {
                Ok(code) => code,
                Err(err) => {
                    run.skipped(&self.daemon, file.as_str(), &err)?;
                    continue;
                }
            };
            let (tx, id) = match stage_genomic_file(&mut self.target, &code, file.as_str()) {
                Ok(staged) => staged,
                Err(err) => {
                    run.skipped(&self.daemon, file.as_str(), &err)?;
                    continue;
                }
            };
            run.processed(&self.daemon, file.to_string(), id, 1)?;
            if let Err(err) = tx.commit() {
                return Err(run.abort(&self.daemon, err));
            }
            emit(sink, format!("phase=Insert; {file}"));
        }

        run.finish(&self.daemon, sink)
    }

    fn legacy(&self) -> Result<&LegacyStore, MigrateError> {
        self.legacy
            .as_ref()
            .ok_or_else(|| MigrateError::ConfigMissingValue("legacy_db".to_string()))
    }
}

fn stage_sheet<'a>(
    target: &'a mut TargetStore,
    result: &SheetExtractionResult,
    source_file: &str,
) -> Result<(TargetTx<'a>, i64), MigrateError> {
    let tx = target.transaction()?;
    let sample_id = tx.insert_sheet(result, source_file)?;
    Ok((tx, sample_id))
}

fn stage_genomic_file<'a>(
    target: &'a mut TargetStore,
    code: &SampleCode,
    path: &str,
) -> Result<(TargetTx<'a>, i64), MigrateError> {
    let tx = target.transaction()?;
    let id = tx.insert_genomic_file(code, path, MigrationKind::Vcf)?;
    Ok((tx, id))
}

/// Book-keeping of one run: counters, item lists and the daemon handle.
/// Every status push goes through the daemon client and its error is
/// returned to the caller.
struct Run {
    kind: MigrationKind,
    report: StatusReport,
    handle: DaemonHandle,
    items: Vec<ItemResult>,
    errors: Vec<ItemError>,
}

impl Run {
    fn start<D: DaemonClient>(
        daemon: &D,
        kind: MigrationKind,
        source_files: Vec<String>,
        total: usize,
    ) -> Result<Self, MigrateError> {
        let process_id = format!("{kind}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"));
        let report = StatusReport::new(process_id, source_files, total as u64);
        let handle = daemon.create(&report.snapshot())?;
        tracing::info!(kind = %kind, process = report.process_id(), total, "migration started");
        Ok(Self {
            kind,
            report,
            handle,
            items: Vec::new(),
            errors: Vec::new(),
        })
    }

    fn processed<D: DaemonClient>(
        &mut self,
        daemon: &D,
        source: String,
        id: i64,
        records: usize,
    ) -> Result<(), MigrateError> {
        self.report.record_processed();
        self.items.push(ItemResult {
            source,
            id,
            records,
        });
        self.push_status(daemon)
    }

    fn not_processed<D: DaemonClient>(
        &mut self,
        daemon: &D,
        source: String,
        message: String,
    ) -> Result<(), MigrateError> {
        self.report.record_not_processed();
        self.errors.push(ItemError { source, message });
        self.push_status(daemon)
    }

    fn skipped<D: DaemonClient>(
        &mut self,
        daemon: &D,
        source: &str,
        err: &MigrateError,
    ) -> Result<(), MigrateError> {
        tracing::warn!(file = source, error = %err, "file not migrated");
        self.not_processed(daemon, source.to_string(), err.to_string())
    }

    /// Marks the run failed and hands `err` back for the caller to return.
    /// The failure status is still sent; if that send fails too, the
    /// original error wins.
    fn abort<D: DaemonClient>(&mut self, daemon: &D, err: MigrateError) -> MigrateError {
        tracing::error!(kind = %self.kind, error = %err, "migration aborted");
        self.report.fail(err.to_string());
        if let Err(status_err) = self.push_status(daemon) {
            tracing::error!(error = %status_err, "failure status not delivered");
        }
        err
    }

    fn finish<D: DaemonClient>(
        mut self,
        daemon: &D,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, MigrateError> {
        self.report.finish();
        emit(sink, format!("phase=Report; status={}", self.report.status()));
        self.push_status(daemon)?;
        tracing::info!(
            kind = %self.kind,
            processed = self.report.processed(),
            not_processed = self.report.not_processed(),
            "migration finished"
        );
        Ok(RunSummary {
            kind: self.kind,
            process_id: self.report.process_id().to_string(),
            status: self.report.status(),
            total: self.report.total(),
            processed: self.report.processed(),
            not_processed: self.report.not_processed(),
            items: self.items,
            errors: self.errors,
        })
    }

    fn push_status<D: DaemonClient>(&self, daemon: &D) -> Result<(), MigrateError> {
        daemon.update(&self.handle, &self.report.snapshot())
    }
}
