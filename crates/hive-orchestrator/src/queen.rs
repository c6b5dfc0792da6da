use crate::analyzer::{fingerprint, RuleTable, TaskAnalysis, TaskAnalyzer, TaskType};
use crate::batcher::{Batch, BatchPlan, DependencyBatcher, DependencyTable};
use crate::monitor::RunMonitor;
use crate::options::SubmitOptions;
use crate::planner::{ActionPlanner, AgentContext};
use crate::roles::{RoleCatalog, RoleDefinition};
use futures_util::future::join_all;
use hive_core::{
    AgentRun, AgentRunStatus, ErrorKind, EventKind, FailureRecord, HiveError, HiveResult,
    Objective, ObjectiveEvent, ObjectiveId, ObjectiveStatus, ToolCall,
};
use hive_memory::{
    scoped_key, CoordinationStore, CoordinationStoreExt, Namespace, PatternOutcome, QueryFilter,
};
use hive_tools::CapabilityRouter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;
const OBJECTIVE_KEY: &str = "objective";
const RUN_KEY: &str = "run";
const CALLS_KEY: &str = "calls";
const CANCELLED: &str = "objective cancelled";

/// Final account of one objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveReport {
    pub objective: Objective,
    /// `None` only if the objective never got as far as analysis.
    pub analysis: Option<TaskAnalysis>,
    pub batches: BatchPlan,
    /// Every run, in batch order.
    pub runs: Vec<AgentRun>,
    pub failed_roles: Vec<String>,
    pub skipped_roles: Vec<String>,
    pub duration_ms: u64,
}

impl ObjectiveReport {
    pub fn status(&self) -> ObjectiveStatus {
        self.objective.status
    }

    pub fn run(&self, role: &str) -> Option<&AgentRun> {
        self.runs.iter().find(|r| r.role == role)
    }

    pub fn succeeded_roles(&self) -> Vec<String> {
        self.runs
            .iter()
            .filter(|r| r.status == AgentRunStatus::Succeeded)
            .map(|r| r.role.clone())
            .collect()
    }
}

struct RunningObjective {
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<ObjectiveReport>>,
}

struct QueenInner {
    store: Arc<dyn CoordinationStore>,
    router: Arc<CapabilityRouter>,
    planner: Arc<dyn ActionPlanner>,
    catalog: RoleCatalog,
    dependencies: DependencyTable,
    analyzer: TaskAnalyzer,
    monitor: RunMonitor,
    events: broadcast::Sender<ObjectiveEvent>,
    running: Mutex<HashMap<ObjectiveId, RunningObjective>>,
}

/// Everything a single agent run needs besides the shared queen state.
#[derive(Clone)]
struct RunJob {
    objective_id: ObjectiveId,
    objective: String,
    fingerprint: String,
    task_type: TaskType,
    role: RoleDefinition,
    deadline: Option<Duration>,
}

/// The objective control loop.
///
/// Accepts objectives, has them analyzed and batched, runs each batch's
/// agents (concurrently by default), and records every run, result, and
/// failure in the coordination store. Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct Queen {
    inner: Arc<QueenInner>,
}

impl Queen {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        router: Arc<CapabilityRouter>,
        planner: Arc<dyn ActionPlanner>,
        catalog: RoleCatalog,
        rules: RuleTable,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let dependencies = catalog.dependency_table();
        Self {
            inner: Arc::new(QueenInner {
                analyzer: TaskAnalyzer::new(rules, Arc::clone(&store)),
                store,
                router,
                planner,
                catalog,
                dependencies,
                monitor: RunMonitor::new(),
                events,
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn analyzer(&self) -> &TaskAnalyzer {
        &self.inner.analyzer
    }

    pub fn catalog(&self) -> &RoleCatalog {
        &self.inner.catalog
    }

    pub fn monitor(&self) -> &RunMonitor {
        &self.inner.monitor
    }

    /// Progress events for every objective this queen runs.
    pub fn subscribe(&self) -> broadcast::Receiver<ObjectiveEvent> {
        self.inner.events.subscribe()
    }

    /// Analyze and batch `description` without running anything.
    pub async fn plan(&self, description: &str, options: &SubmitOptions) -> (TaskAnalysis, BatchPlan) {
        let analysis = self.inner.analyzer.analyze(description).await;
        let roles = select_roles(&analysis, options.max_agents);
        let plan = DependencyBatcher::batches(&roles, &self.inner.dependencies);
        (analysis, plan)
    }

    /// Persist a pending objective and start running it in the background.
    ///
    /// The queen holds the objective's task handle until [`Queen::wait`]
    /// collects it, so every submitted objective must be waited on once.
    pub async fn submit(
        &self,
        description: impl Into<String>,
        options: SubmitOptions,
    ) -> HiveResult<ObjectiveId> {
        let objective = Objective::new(description).with_priority(options.priority);
        let id = objective.id;
        self.inner
            .store
            .put_json(&Namespace::objective(id), OBJECTIVE_KEY, &objective, None)
            .await?;
        info!(objective_id = %id, description = %objective.description, "Objective submitted");

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run_objective(objective, options, cancel_rx).await });
        self.inner.running.lock().insert(
            id,
            RunningObjective {
                cancel: cancel_tx,
                handle: Some(handle),
            },
        );
        Ok(id)
    }

    /// Wait for a submitted objective to finish and release its handle.
    /// Each objective can be waited on once; afterwards it is unknown to
    /// [`Queen::cancel`] and only [`Queen::status`] reports it.
    pub async fn wait(&self, id: ObjectiveId) -> HiveResult<ObjectiveReport> {
        let handle = self
            .inner
            .running
            .lock()
            .get_mut(&id)
            .and_then(|r| r.handle.take())
            .ok_or_else(|| HiveError::Orchestrator(format!("objective {id} is not awaitable")))?;

        let result = handle.await;
        self.inner.running.lock().remove(&id);
        result.map_err(|e| HiveError::Orchestrator(format!("objective {id} task failed: {e}")))
    }

    /// Submit and wait.
    pub async fn execute(
        &self,
        description: impl Into<String>,
        options: SubmitOptions,
    ) -> HiveResult<ObjectiveReport> {
        let id = self.submit(description, options).await?;
        self.wait(id).await
    }

    /// Request cancellation. Returns `false` if the objective is unknown or
    /// already finished.
    pub fn cancel(&self, id: ObjectiveId) -> bool {
        let running = self.inner.running.lock();
        match running.get(&id) {
            Some(r) => {
                let sent = r.cancel.send(true).is_ok();
                if sent {
                    info!(objective_id = %id, "Cancellation requested");
                }
                sent
            }
            None => false,
        }
    }

    /// Last persisted status of an objective.
    pub async fn status(&self, id: ObjectiveId) -> HiveResult<Option<ObjectiveStatus>> {
        let objective: Option<Objective> = self
            .inner
            .store
            .get_json(&Namespace::objective(id), OBJECTIVE_KEY)
            .await?;
        Ok(objective.map(|o| o.status))
    }
}

/// Primary first, supporting roles in declared order, at most `max_agents`.
fn select_roles(analysis: &TaskAnalysis, max_agents: usize) -> Vec<String> {
    analysis.roles().into_iter().take(max_agents).collect()
}

impl QueenInner {
    fn emit(&self, event: ObjectiveEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn is_critical(&self, role: &str, analysis: &TaskAnalysis, options: &SubmitOptions) -> bool {
        if !options.critical_roles.is_empty() {
            return options.critical_roles.contains(role);
        }
        self.catalog
            .get(role)
            .map(|r| r.critical)
            .unwrap_or(role == analysis.primary_agent)
    }

    async fn persist_objective(&self, objective: &Objective) {
        if let Err(e) = self
            .store
            .put_json(&Namespace::objective(objective.id), OBJECTIVE_KEY, objective, None)
            .await
        {
            warn!(objective_id = %objective.id, error = %e, "Failed to persist objective");
        }
    }

    async fn run_objective(
        self: Arc<Self>,
        mut objective: Objective,
        options: SubmitOptions,
        cancel: watch::Receiver<bool>,
    ) -> ObjectiveReport {
        let started = Instant::now();
        let id = objective.id;
        objective.transition(ObjectiveStatus::Running);
        self.persist_objective(&objective).await;
        self.emit(ObjectiveEvent::new(
            id,
            None,
            EventKind::Started,
            serde_json::json!({ "description": objective.description }),
        ));

        let analysis = self.analyzer.analyze(&objective.description).await;
        let fp = fingerprint(&objective.description);
        let roles = select_roles(&analysis, options.max_agents);
        let plan = DependencyBatcher::batches(&roles, &self.dependencies);
        info!(
            objective_id = %id,
            task_type = %analysis.task_type,
            roles = roles.len(),
            batches = plan.len(),
            "Objective planned"
        );

        let ns = Namespace::objective(id);
        for (key, value) in [
            ("analysis", serde_json::to_value(&analysis)),
            ("plan", serde_json::to_value(&plan)),
        ] {
            let stored = match value {
                Ok(v) => self.store.store(&ns, key, v, None).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = stored {
                warn!(objective_id = %id, key, error = %e, "Failed to persist objective plan");
            }
        }

        let mut runs: Vec<AgentRun> = Vec::new();
        let mut abort: Option<String> = None;
        if roles.is_empty() {
            abort = Some("no agent roles selected".to_string());
        }

        for batch in &plan.batches {
            let job_for = |role: &str| RunJob {
                objective_id: id,
                objective: objective.description.clone(),
                fingerprint: fp.clone(),
                task_type: analysis.task_type.clone(),
                role: self
                    .catalog
                    .get(role)
                    .cloned()
                    .unwrap_or_else(|| RoleDefinition::new(role, false)),
                deadline: options.deadline_override(),
            };

            let skip_reason = if *cancel.borrow() {
                Some(CANCELLED.to_string())
            } else {
                abort.as_ref().map(|r| format!("objective aborted: {r}"))
            };
            if let Some(reason) = skip_reason {
                for role in &batch.roles {
                    let mut run = AgentRun::new(id, role.as_str(), batch.index);
                    run.skip(reason.as_str());
                    runs.push(self.finish_run(run, &job_for(role)).await);
                }
                continue;
            }

            if batch.fail_open {
                self.emit(ObjectiveEvent::new(
                    id,
                    Some(batch.index),
                    EventKind::DependencyOverride,
                    serde_json::json!({
                        "roles": batch.roles,
                        "kind": ErrorKind::DependencyUnschedulable,
                    }),
                ));
            }

            let (ready, gated) = self.gate(batch, &roles, &runs);
            let mut batch_runs = Vec::new();
            for (role, unmet) in gated {
                let mut run = AgentRun::new(id, role.as_str(), batch.index);
                run.skip(format!("prerequisite {unmet} did not succeed"));
                if self.is_critical(&role, &analysis, &options) {
                    warn!(objective_id = %id, role = %role, prerequisite = %unmet, "Critical role skipped");
                    abort.get_or_insert_with(|| format!("critical role {role} skipped"));
                }
                batch_runs.push(self.finish_run(run, &job_for(&role)).await);
            }

            if let Some(reason) = abort.clone() {
                for role in ready {
                    let mut run = AgentRun::new(id, role.as_str(), batch.index);
                    run.skip(format!("objective aborted: {reason}"));
                    batch_runs.push(self.finish_run(run, &job_for(&role)).await);
                }
            } else if options.allow_parallel {
                batch_runs.extend(self.run_parallel(batch, ready, &job_for, &cancel).await);
            } else {
                for role in ready {
                    let run = AgentRun::new(id, role.as_str(), batch.index);
                    let job = job_for(&role);
                    let run = if *cancel.borrow() {
                        let mut run = run;
                        run.skip(CANCELLED);
                        self.finish_run(run, &job).await
                    } else {
                        Arc::clone(&self).execute_run(run, job, cancel.clone()).await
                    };
                    batch_runs.push(run);
                }
            }

            for run in &batch_runs {
                let kind = match run.status {
                    AgentRunStatus::Succeeded => EventKind::AgentCompleted,
                    AgentRunStatus::Failed => EventKind::AgentFailed,
                    _ => continue,
                };
                self.emit(ObjectiveEvent::new(
                    id,
                    Some(batch.index),
                    kind,
                    serde_json::json!({
                        "role": run.role,
                        "runId": run.id,
                        "failure": run.failure,
                    }),
                ));
                if run.status == AgentRunStatus::Failed && self.is_critical(&run.role, &analysis, &options) {
                    error!(objective_id = %id, role = %run.role, "Critical role failed");
                    abort.get_or_insert_with(|| format!("critical role {} failed", run.role));
                }
            }
            self.emit(ObjectiveEvent::new(
                id,
                Some(batch.index),
                EventKind::BatchCompleted,
                serde_json::json!({
                    "roles": batch.roles,
                    "statuses": batch_runs
                        .iter()
                        .map(|r| (r.role.clone(), r.status))
                        .collect::<BTreeMap<_, _>>(),
                }),
            ));
            runs.extend(batch_runs);
        }

        let failed_roles: Vec<String> = runs
            .iter()
            .filter(|r| r.status == AgentRunStatus::Failed)
            .map(|r| r.role.clone())
            .collect();
        let skipped_roles: Vec<String> = runs
            .iter()
            .filter(|r| r.status == AgentRunStatus::Skipped)
            .map(|r| r.role.clone())
            .collect();
        let cancelled = runs
            .iter()
            .any(|r| r.skip_reason.as_deref() == Some(CANCELLED));

        let (status, event) = if abort.is_some() {
            (ObjectiveStatus::Failed, EventKind::ObjectiveFailed)
        } else if cancelled {
            (ObjectiveStatus::Cancelled, EventKind::ObjectiveCancelled)
        } else {
            (ObjectiveStatus::Completed, EventKind::ObjectiveCompleted)
        };

        if status == ObjectiveStatus::Completed {
            if let Err(e) = self
                .analyzer
                .remember_success(&objective.description, &analysis)
                .await
            {
                warn!(objective_id = %id, error = %e, "Failed to remember successful analysis");
            }
        }
        objective.transition(status);
        self.persist_objective(&objective).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            objective_id = %id,
            status = %status,
            failed = failed_roles.len(),
            skipped = skipped_roles.len(),
            duration_ms,
            "Objective finished"
        );
        self.emit(ObjectiveEvent::new(
            id,
            None,
            event,
            serde_json::json!({
                "status": status,
                "reason": abort,
                "failedRoles": failed_roles,
                "skippedRoles": skipped_roles,
            }),
        ));

        ObjectiveReport {
            objective,
            analysis: Some(analysis),
            batches: plan,
            runs,
            failed_roles,
            skipped_roles,
            duration_ms,
        }
    }

    /// Split a batch into roles that may run and roles whose in-set
    /// prerequisites did not succeed. In a fail-open batch only prerequisites
    /// that are members of the same batch are overridden; one that already
    /// ran in an earlier batch and failed still gates.
    fn gate(&self, batch: &Batch, active: &[String], done: &[AgentRun]) -> (Vec<String>, Vec<(String, String)>) {
        let mut ready = Vec::new();
        let mut gated = Vec::new();
        for role in &batch.roles {
            let mut overridden = Vec::new();
            let unmet = self
                .dependencies
                .prerequisites(role)
                .iter()
                .filter(|p| active.contains(p))
                .filter(|p| {
                    let unschedulable = batch.fail_open && batch.roles.contains(p);
                    if unschedulable {
                        overridden.push((*p).clone());
                    }
                    !unschedulable
                })
                .find(|p| {
                    !done
                        .iter()
                        .any(|r| &r.role == *p && r.status == AgentRunStatus::Succeeded)
                });
            match unmet {
                Some(p) => gated.push((role.clone(), p.clone())),
                None => {
                    if !overridden.is_empty() {
                        debug!(role = %role, prerequisites = ?overridden, "Running despite unschedulable prerequisites");
                    }
                    ready.push(role.clone());
                }
            }
        }
        (ready, gated)
    }

    async fn run_parallel(
        self: &Arc<Self>,
        batch: &Batch,
        ready: Vec<String>,
        job_for: &impl Fn(&str) -> RunJob,
        cancel: &watch::Receiver<bool>,
    ) -> Vec<AgentRun> {
        let mut pending = Vec::with_capacity(ready.len());
        for role in ready {
            let run = AgentRun::new(job_for(&role).objective_id, role.as_str(), batch.index);
            let job = job_for(&role);
            let handle = tokio::spawn(Arc::clone(self).execute_run(run.clone(), job.clone(), cancel.clone()));
            pending.push((run, job, handle));
        }

        let (meta, handles): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .map(|(run, job, handle)| ((run, job), handle))
            .unzip();
        let results = join_all(handles).await;

        let mut out = Vec::with_capacity(results.len());
        for ((mut run, job), result) in meta.into_iter().zip(results) {
            match result {
                Ok(done) => out.push(done),
                Err(e) => {
                    error!(role = %run.role, error = %e, "Agent task aborted");
                    run.start();
                    run.fail(FailureRecord::new(
                        ErrorKind::PermanentRemoteError,
                        format!("agent task aborted: {e}"),
                        0,
                    ));
                    out.push(self.finish_run(run, &job).await);
                }
            }
        }
        out
    }

    /// One agent run: read prior results, plan, invoke each action, publish
    /// the result.
    async fn execute_run(
        self: Arc<Self>,
        mut run: AgentRun,
        job: RunJob,
        cancel: watch::Receiver<bool>,
    ) -> AgentRun {
        run.start();
        self.monitor.start_run(&run.role, run.id).await;
        debug!(agent_run_id = %run.id, role = %run.role, batch = run.batch_index, "Agent run started");

        let prior_results = match self.prior_results(job.objective_id).await {
            Ok(results) => results,
            Err(e) => {
                run.fail(FailureRecord::new(ErrorKind::StoreUnavailable, e.to_string(), 0));
                return self.finish_run(run, &job).await;
            }
        };
        let ctx = AgentContext {
            objective_id: job.objective_id,
            objective: job.objective.clone(),
            role: job.role.clone(),
            task_type: job.task_type.clone(),
            prior_results,
        };
        let actions = match self.planner.plan(&ctx).await {
            Ok(actions) => actions,
            Err(e) => {
                let kind = match e {
                    HiveError::Store(_) => ErrorKind::StoreUnavailable,
                    _ => ErrorKind::PermanentRemoteError,
                };
                run.fail(FailureRecord::new(kind, format!("planning failed: {e}"), 0));
                return self.finish_run(run, &job).await;
            }
        };

        let mut calls: Vec<ToolCall> = Vec::with_capacity(actions.len());
        for action in &actions {
            if *cancel.borrow() {
                info!(agent_run_id = %run.id, role = %run.role, "Skipping remaining actions after cancellation");
                run.skip(CANCELLED);
                break;
            }
            let call = self.router.invoke(run.id, action, job.deadline).await;
            run.record_call(call.id);
            self.monitor.record_call(&run.role, &call).await;
            let failure = call.outcome.error_kind().map(|kind| {
                FailureRecord::new(kind, call.failure_detail().unwrap_or_default(), call.attempts)
            });
            calls.push(call);
            if let Some(failure) = failure {
                run.fail(failure);
                break;
            }
        }

        if run.status == AgentRunStatus::Running {
            let result = serde_json::json!({
                "runId": run.id,
                "outputs": calls
                    .iter()
                    .filter_map(|c| c.outcome.payload().cloned())
                    .collect::<Vec<_>>(),
            });
            match self
                .store
                .store(&Namespace::objective_results(job.objective_id), &run.role, result, None)
                .await
            {
                Ok(()) => {
                    run.succeed();
                }
                Err(e) => {
                    run.fail(FailureRecord::new(
                        ErrorKind::StoreUnavailable,
                        format!("publishing result failed: {e}"),
                        0,
                    ));
                }
            }
        }

        if !calls.is_empty() {
            if let Err(e) = self
                .store
                .put_json(&Namespace::agent(run.id), &scoped_key(run.id, CALLS_KEY), &calls, None)
                .await
            {
                warn!(agent_run_id = %run.id, error = %e, "Failed to record tool calls");
            }
        }
        self.finish_run(run, &job).await
    }

    async fn prior_results(&self, id: ObjectiveId) -> HiveResult<BTreeMap<String, serde_json::Value>> {
        let entries = self
            .store
            .query(&Namespace::objective_results(id), &QueryFilter::new())
            .await?;
        Ok(entries.into_iter().map(|e| (e.key, e.value)).collect())
    }

    /// Record a terminal run: the run itself, its failure pattern, and the
    /// monitor counters. Store errors are logged only.
    async fn finish_run(&self, run: AgentRun, job: &RunJob) -> AgentRun {
        if let Err(e) = self
            .store
            .put_json(&Namespace::agent(run.id), RUN_KEY, &run, None)
            .await
        {
            warn!(agent_run_id = %run.id, error = %e, "Failed to persist agent run");
        }
        if let Some(failure) = run.failure.as_ref().filter(|_| run.status == AgentRunStatus::Failed) {
            let ns = Namespace::pattern(PatternOutcome::Failure, job.task_type.as_str());
            let key = format!("{}::{}", job.fingerprint, run.role);
            if let Err(e) = self.store.put_json(&ns, &key, failure, None).await {
                warn!(agent_run_id = %run.id, error = %e, "Failed to record failure pattern");
            }
            warn!(
                agent_run_id = %run.id,
                role = %run.role,
                kind = %failure.kind,
                message = %failure.message,
                "Agent run failed"
            );
        }
        self.monitor.finish_run(&run).await;
        run
    }
}
