// src/engine/job.rs

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::channel::{wire_edge, EdgeSender, InputGate};
use crate::config::{CriterionKind, JobConfig};
use crate::errors::{IterdagError, Result};
use crate::io::{RecordSink, RecordSource};
use crate::iteration::{
    backchannel, DeltaWorker, HeadWorker, IntermediateWorker, IterationProbe, NoopProbe,
    OutputWorker, SourceWorker, TailWorker, WorkerContext,
};
use crate::stage::{DeltaStage, MapStage, MatchStage, ReduceStage};
use crate::sync::{
    Barrier, ControlEvent, ControlReceiver, ConvergenceCriterion, L1NormCriterion,
    MaxSuperstepsOnly, SyncSignal, SyncWorker, TerminationReason,
};
use crate::types::{PartitionId, Role, Superstep};

use super::graph::{
    JobGraph, COMPANION_TO_INTERMEDIATE, HEAD_TO_DELTA, HEAD_TO_INTERMEDIATE, HEAD_TO_OUTPUT,
    INTERMEDIATE_TO_TAIL, SEED_TO_HEAD, TAIL_TO_DELTA, TRANSITION_TO_HEAD,
};

/// The user computation of one iteration.
#[derive(Debug, Clone)]
pub struct JobStages {
    pub head: Arc<dyn MapStage>,
    pub intermediate: Arc<dyn MatchStage>,
    pub tail: Arc<dyn ReduceStage>,
    pub delta: Arc<dyn DeltaStage>,
}

/// External inputs, each read once during superstep 0.
#[derive(Debug, Clone)]
pub struct JobInputs {
    pub seed: Arc<dyn RecordSource>,
    pub companion: Arc<dyn RecordSource>,
    /// Broadcast to every Head partition and handed to the map stage.
    pub transition: Option<Arc<dyn RecordSource>>,
}

/// How a finished job ended.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub final_superstep: Superstep,
    pub termination: TerminationReason,
    /// Aggregated delta statistic per superstep.
    pub statistics: Vec<f64>,
}

impl JobReport {
    pub fn converged(&self) -> bool {
        matches!(self.termination, TerminationReason::Converged(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.termination {
            TerminationReason::Converged(reason) => reason.as_deref(),
            TerminationReason::IterationCap => Some("superstep cap reached"),
        }
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.converged() {
            "converged"
        } else {
            "stopped"
        };
        write!(f, "{verdict} after superstep {}", self.final_superstep)?;
        if let Some(reason) = self.reason() {
            write!(f, " ({reason})")?;
        }
        if let Some(last) = self.statistics.last() {
            write!(f, ", last delta {last:e}")?;
        }
        Ok(())
    }
}

/// Criterion configured in `[convergence]`.
pub fn criterion_from_config(config: &JobConfig) -> Arc<dyn ConvergenceCriterion> {
    match config.convergence.criterion {
        CriterionKind::L1Norm => Arc::new(L1NormCriterion::new(config.convergence.epsilon)),
        CriterionKind::MaxSupersteps => Arc::new(MaxSuperstepsOnly),
    }
}

/// An iterative job ready to run: config, user stages, inputs and sink.
pub struct IterationJob {
    config: JobConfig,
    stages: JobStages,
    inputs: JobInputs,
    sink: Arc<dyn RecordSink>,
    criterion: Arc<dyn ConvergenceCriterion>,
    probe: Arc<dyn IterationProbe>,
}

impl fmt::Debug for IterationJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterationJob")
            .field("name", &self.config.job.name)
            .field("stages", &self.stages)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl IterationJob {
    pub fn new(
        config: JobConfig,
        stages: JobStages,
        inputs: JobInputs,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let criterion = criterion_from_config(&config);
        Self {
            config,
            stages,
            inputs,
            sink,
            criterion,
            probe: Arc::new(NoopProbe),
        }
    }

    /// Replace the criterion derived from `[convergence]`.
    pub fn with_criterion(mut self, criterion: Arc<dyn ConvergenceCriterion>) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn IterationProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn graph(&self) -> Result<JobGraph> {
        JobGraph::for_job(&self.config, self.inputs.transition.is_some())
    }

    /// Run the job to termination.
    ///
    /// Spawns one worker per role and partition, drives Sync on the current
    /// task, and waits for every worker before returning. The first failing
    /// worker's error is returned; follow-on disconnects are not.
    pub async fn run(self) -> Result<JobReport> {
        let graph = self.graph()?;
        let parallelism = self.config.job.parallelism;
        let capacity = self.config.job.channel_capacity;

        info!(
            job = %self.config.job.name,
            parallelism,
            max_supersteps = self.config.job.max_supersteps,
            "starting iteration job"
        );

        let (seed_out, seed_in) = wire_edge(graph.spec(SEED_TO_HEAD)?, capacity);
        let (companion_out, companion_in) =
            wire_edge(graph.spec(COMPANION_TO_INTERMEDIATE)?, capacity);
        let (h2i_out, h2i_in) = wire_edge(graph.spec(HEAD_TO_INTERMEDIATE)?, capacity);
        let (i2t_out, i2t_in) = wire_edge(graph.spec(INTERMEDIATE_TO_TAIL)?, capacity);
        let (h2d_out, h2d_in) = wire_edge(graph.spec(HEAD_TO_DELTA)?, capacity);
        let (t2d_out, t2d_in) = wire_edge(graph.spec(TAIL_TO_DELTA)?, capacity);
        let (h2o_out, h2o_in) = wire_edge(graph.spec(HEAD_TO_OUTPUT)?, capacity);
        let (transition_out, transition_in): (Vec<EdgeSender>, Vec<Option<InputGate>>) =
            if graph.contains(TRANSITION_TO_HEAD) {
                let (out, gates) = wire_edge(graph.spec(TRANSITION_TO_HEAD)?, capacity);
                (out, gates.into_iter().map(Some).collect())
            } else {
                (Vec::new(), (0..parallelism).map(|_| None).collect())
            };

        let (signal_tx, signal_rx) = mpsc::channel::<SyncSignal>(capacity.max(2 * parallelism));
        let (control_tx, control_rx) = watch::channel(ControlEvent::Proceed(0));
        let mut workers: JoinSet<Result<()>> = JoinSet::new();
        let spawner = Spawner {
            signals: signal_tx,
            control: control_rx,
        };

        let sources = [
            (Role::SeedSource, &self.inputs.seed, seed_out),
            (Role::CompanionSource, &self.inputs.companion, companion_out),
        ];
        for (role, source, outs) in sources {
            spawner.spawn_sources(&mut workers, role, source, outs, parallelism);
        }
        if let Some(source) = &self.inputs.transition {
            spawner.spawn_sources(
                &mut workers,
                Role::TransitionSource,
                source,
                transition_out,
                parallelism,
            );
        }

        let mut seed_in = seed_in.into_iter();
        let mut transition_in = transition_in.into_iter();
        let mut h2i_out = h2i_out.into_iter();
        let mut h2d_out = h2d_out.into_iter();
        let mut h2o_out = h2o_out.into_iter();
        let mut h2i_in = h2i_in.into_iter();
        let mut companion_in = companion_in.into_iter();
        let mut i2t_out = i2t_out.into_iter();
        let mut i2t_in = i2t_in.into_iter();
        let mut t2d_out = t2d_out.into_iter();
        let mut h2d_in = h2d_in.into_iter();
        let mut t2d_in = t2d_in.into_iter();
        let mut h2o_in = h2o_in.into_iter();

        let keys = self.config.keys;
        let memory_budget = self.config.memory_budget();

        for partition in 0..parallelism {
            let (bc_writer, bc_reader) = backchannel(partition);

            let head = HeadWorker {
                ctx: spawner.context(Role::Head, partition, &self.probe),
                stage: Arc::clone(&self.stages.head),
                seed: part(&mut seed_in, SEED_TO_HEAD, partition)?,
                transition: part(&mut transition_in, TRANSITION_TO_HEAD, partition)?,
                backchannel: bc_reader,
                to_intermediate: part(&mut h2i_out, HEAD_TO_INTERMEDIATE, partition)?,
                to_delta: part(&mut h2d_out, HEAD_TO_DELTA, partition)?,
                to_output: part(&mut h2o_out, HEAD_TO_OUTPUT, partition)?,
            };
            spawner.spawn(&mut workers, Role::Head, partition, head.run());

            let intermediate = IntermediateWorker {
                ctx: spawner.context(Role::Intermediate, partition, &self.probe),
                stage: Arc::clone(&self.stages.intermediate),
                keys,
                memory_budget,
                working: part(&mut h2i_in, HEAD_TO_INTERMEDIATE, partition)?,
                companion: Some(part(&mut companion_in, COMPANION_TO_INTERMEDIATE, partition)?),
                to_tail: part(&mut i2t_out, INTERMEDIATE_TO_TAIL, partition)?,
            };
            spawner.spawn(&mut workers, Role::Intermediate, partition, intermediate.run());

            let tail = TailWorker {
                ctx: spawner.context(Role::Tail, partition, &self.probe),
                stage: Arc::clone(&self.stages.tail),
                keys,
                memory_budget,
                max_file_handles: self.config.job.max_file_handles,
                input: part(&mut i2t_in, INTERMEDIATE_TO_TAIL, partition)?,
                backchannel: bc_writer,
                to_delta: part(&mut t2d_out, TAIL_TO_DELTA, partition)?,
            };
            spawner.spawn(&mut workers, Role::Tail, partition, tail.run());

            let delta = DeltaWorker {
                ctx: spawner.context(Role::DeltaPath, partition, &self.probe),
                stage: Arc::clone(&self.stages.delta),
                keys,
                from_head: part(&mut h2d_in, HEAD_TO_DELTA, partition)?,
                from_tail: part(&mut t2d_in, TAIL_TO_DELTA, partition)?,
            };
            spawner.spawn(&mut workers, Role::DeltaPath, partition, delta.run());

            let output = OutputWorker {
                ctx: spawner.context(Role::Output, partition, &self.probe),
                from_head: part(&mut h2o_in, HEAD_TO_OUTPUT, partition)?,
                sink: Arc::clone(&self.sink),
            };
            spawner.spawn(&mut workers, Role::Output, partition, output.run());
        }

        // Sync must see the channel close once every worker is gone.
        let Spawner { signals, control } = spawner;
        drop(signals);
        drop(control);

        let barrier = Barrier::new(parallelism, parallelism, self.config.job.max_supersteps);
        let sync = SyncWorker::new(barrier, Arc::clone(&self.criterion), signal_rx, control_tx);
        let outcome = sync.run().await;

        let worker_error = join_workers(&mut workers).await;

        let outcome = match (outcome, worker_error) {
            (Ok(outcome), None) => outcome,
            (Ok(_), Some(err)) => return Err(err),
            (Err(err), Some(worker)) if err.is_secondary() && !worker.is_secondary() => {
                return Err(worker);
            }
            (Err(err), _) => return Err(err),
        };

        let report = JobReport {
            final_superstep: outcome.final_superstep,
            termination: outcome.reason,
            statistics: outcome.statistics,
        };
        info!(job = %self.config.job.name, %report, "iteration job finished");
        Ok(report)
    }
}

/// Hands out worker contexts and spawns workers under abort supervision.
struct Spawner {
    signals: mpsc::Sender<SyncSignal>,
    control: watch::Receiver<ControlEvent>,
}

impl Spawner {
    fn context(
        &self,
        role: Role,
        partition: PartitionId,
        probe: &Arc<dyn IterationProbe>,
    ) -> WorkerContext {
        WorkerContext {
            role,
            partition,
            signals: self.signals.clone(),
            control: ControlReceiver::new(self.control.clone()),
            probe: Arc::clone(probe),
        }
    }

    fn spawn_sources(
        &self,
        workers: &mut JoinSet<Result<()>>,
        role: Role,
        source: &Arc<dyn RecordSource>,
        outs: Vec<EdgeSender>,
        splits: usize,
    ) {
        for (partition, out) in outs.into_iter().enumerate() {
            let worker = SourceWorker {
                role,
                partition,
                splits,
                source: Arc::clone(source),
                out,
            };
            self.spawn(workers, role, partition, worker.run());
        }
    }

    /// Run `work` on the join set. A failure is reported to Sync as an abort;
    /// if Sync is already gone the error is returned through the join set. A
    /// published `Abort` cancels the worker wherever it is blocked.
    fn spawn<F>(&self, workers: &mut JoinSet<Result<()>>, role: Role, partition: PartitionId, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let signals = self.signals.clone();
        let mut control = self.control.clone();

        workers.spawn(async move {
            let result = tokio::select! {
                result = work => result,
                _ = aborted(&mut control) => {
                    debug!(%role, partition, "worker cancelled by abort");
                    return Ok(());
                }
            };

            let Err(error) = result else {
                return Ok(());
            };
            if error.is_secondary() {
                debug!(%role, partition, error = %error, "worker stopped");
            } else {
                error!(%role, partition, error = %error, "worker failed");
            }

            match signals
                .send(SyncSignal::Abort {
                    role,
                    partition,
                    error,
                })
                .await
            {
                Ok(()) => Ok(()),
                Err(mpsc::error::SendError(SyncSignal::Abort { error, .. })) => {
                    Err(error.in_stage(role, partition))
                }
                Err(_) => Ok(()),
            }
        });
    }
}

/// Resolves once Sync publishes `Abort`; never resolves if Sync is gone.
async fn aborted(control: &mut watch::Receiver<ControlEvent>) {
    if control
        .wait_for(|event| matches!(event, ControlEvent::Abort))
        .await
        .is_err()
    {
        std::future::pending::<()>().await;
    }
}

/// Wait for every worker; return the most relevant error, if any.
async fn join_workers(workers: &mut JoinSet<Result<()>>) -> Option<IterdagError> {
    let mut first: Option<IterdagError> = None;

    while let Some(joined) = workers.join_next().await {
        let err = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err,
            Err(join_err) => {
                warn!(error = %join_err, "worker task did not complete");
                IterdagError::Other(join_err.into())
            }
        };
        first = match first {
            Some(existing) if existing.is_secondary() && !err.is_secondary() => Some(err),
            Some(existing) => Some(existing),
            None => Some(err),
        };
    }

    first
}

fn part<T>(parts: &mut impl Iterator<Item = T>, edge: &str, partition: PartitionId) -> Result<T> {
    parts.next().ok_or_else(|| {
        IterdagError::ConfigError(format!("edge '{edge}' has no endpoint for partition {partition}"))
    })
}
