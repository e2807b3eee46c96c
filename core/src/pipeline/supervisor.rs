//! One job's task group: spawns stage tasks on a thread scope, waits for
//! them against the job deadline, and tears the process group down on the
//! first real failure.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::codec::{check_exit, ExitReport, ProcessGroup, StageRole};
use crate::pipeline::error::PipelineError;
use crate::telemetry::{PipelineCounters, Stage, TelemetryTimer};

/// Stand-in deadline for limits too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// `started + limit`, clamped when the sum does not fit.
pub(crate) fn deadline_after(started: Instant, limit: Duration) -> Instant {
    started.checked_add(limit).or_else(|| started.checked_add(FAR_FUTURE)).unwrap_or(started)
}

/// Shared stop signal for pump loops. Killing the processes unblocks pipe
/// I/O; the flag stops loops that are between reads.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) struct TaskEvent {
    stage: Stage,
    elapsed: Duration,
    result: Result<PipelineCounters, PipelineError>,
}

/// Run `task` on the scope. Its outcome (panics included) is reported on
/// `events`; its value comes back through the join handle.
pub(crate) fn spawn_task<'scope, 'env, T, F>(
    scope: &'scope Scope<'scope, 'env>,
    events: &Sender<TaskEvent>,
    stage: Stage,
    task: F,
) -> ScopedJoinHandle<'scope, Option<T>>
where
    F: FnOnce() -> Result<(T, PipelineCounters), PipelineError> + Send + 'scope,
    T: Send + 'scope,
{
    let events = events.clone();
    scope.spawn(move || {
        let started = Instant::now();
        let (value, result) = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok((value, counters))) => (Some(value), Ok(counters)),
            Ok(Err(e)) => (None, Err(e)),
            Err(_) => (None, Err(PipelineError::Panicked { stage })),
        };
        let _ = events.send(TaskEvent { stage, elapsed: started.elapsed(), result });
        value
    })
}

pub(crate) struct Supervisor {
    limit: Duration,
    deadline: Instant,
    stop_on: Option<Stage>,
    pending: usize,
    failure: Option<PipelineError>,
    finished_early: bool,
    counters: PipelineCounters,
}

pub(crate) struct SupervisorOutcome {
    pub failure: Option<PipelineError>,
    /// The `stop_on` stage succeeded and the rest was torn down on purpose.
    pub finished_early: bool,
    pub counters: PipelineCounters,
}

impl Supervisor {
    /// `started` anchors the deadline, so time spent before the streaming
    /// stages (probing) counts against the same limit.
    pub fn new(limit: Duration, started: Instant) -> Self {
        Self {
            limit,
            deadline: deadline_after(started, limit),
            stop_on: None,
            pending: 0,
            failure: None,
            finished_early: false,
            counters: PipelineCounters::default(),
        }
    }

    /// Success of `stage` ends the invocation; everything else is torn down.
    pub fn stop_on_success(mut self, stage: Stage) -> Self {
        self.stop_on = Some(stage);
        self
    }

    pub fn expect(&mut self, tasks: usize) {
        self.pending += tasks;
    }

    fn teardown(group: &mut ProcessGroup, cancel: &CancelFlag) {
        cancel.cancel();
        group.terminate_all();
    }

    fn record(&mut self, stage: Option<Stage>, err: PipelineError, group: &mut ProcessGroup, cancel: &CancelFlag) {
        let primary = !err.is_secondary();
        match (stage, primary) {
            (Some(stage), true) => error!("[SUPERVISOR] {} failed: {}", stage, err),
            (None, true) => error!("[SUPERVISOR] {}", err),
            (_, false) => debug!("[SUPERVISOR] {:?} ended with {}", stage, err),
        }

        let replace = match &self.failure {
            None => true,
            Some(prev) => prev.is_secondary() && primary,
        };
        if replace {
            self.failure = Some(err);
        }

        // Secondary failures mean a peer already went away; the rest unwinds
        // by itself and the deadline still applies.
        if primary && !group.is_torn_down() {
            Self::teardown(group, cancel);
        }
    }

    /// Block until every expected task has reported.
    pub fn run(
        &mut self,
        events: &Receiver<TaskEvent>,
        group: &mut ProcessGroup,
        cancel: &CancelFlag,
        timer: &mut TelemetryTimer,
    ) {
        while self.pending > 0 {
            let event = if group.is_torn_down() {
                events.recv().ok()
            } else {
                match events.recv_deadline(self.deadline) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => {
                        let limit = self.limit;
                        self.record(None, PipelineError::Timeout { limit }, group, cancel);
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            };
            let Some(event) = event else { break };

            self.pending -= 1;
            timer.add_stage_time(event.stage, event.elapsed);

            match event.result {
                Ok(counters) => {
                    debug!("[{}] done in {:?}", event.stage, event.elapsed);
                    self.counters.merge(&counters);
                    if self.stop_on == Some(event.stage) && self.failure.is_none() {
                        info!("[SUPERVISOR] {} finished the job, stopping remaining stages", event.stage);
                        self.finished_early = true;
                        Self::teardown(group, cancel);
                    }
                }
                Err(e) if self.finished_early => {
                    debug!("[{}] unwound after early finish: {}", event.stage, e);
                }
                Err(e) => self.record(Some(event.stage), e, group, cancel),
            }
        }
    }

    pub fn into_outcome(self) -> SupervisorOutcome {
        SupervisorOutcome {
            failure: self.failure,
            finished_early: self.finished_early,
            counters: self.counters,
        }
    }
}

/// Combine the task outcome with how the processes exited.
///
/// A task failure that is only the echo of a peer going away yields to a
/// process that exited non-zero on its own; anything else wins as recorded.
pub(crate) fn settle(
    outcome: &mut SupervisorOutcome,
    reports: &[ExitReport],
    stderr: &[(StageRole, String)],
) -> Result<(), PipelineError> {
    if outcome.finished_early {
        return Ok(());
    }

    let tail = |role: StageRole| {
        stderr.iter().find(|(r, _)| *r == role).map(|(_, s)| s.as_str()).unwrap_or("")
    };
    let process_failure = reports.iter().find_map(|r| check_exit(r, tail(r.role)).err());

    match (outcome.failure.take(), process_failure) {
        (Some(f), Some(p)) if f.is_secondary() => Err(p.into()),
        (Some(f), _) => Err(f),
        (None, Some(p)) => Err(p.into()),
        (None, None) => Ok(()),
    }
}
