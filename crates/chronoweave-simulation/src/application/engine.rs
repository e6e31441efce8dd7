//! The simulation engine.
//!
//! Drives one run's timeline cursor from start to end. At every step it
//! checks the session's flags, calls the narrative generator for the active
//! characters, applies the output to the event log and the arc tracker, and
//! emits one progress frame per change, in the order the changes were made.
//!
//! Checkpoints run before each step, before each generator call, after each
//! call returns (so a result that arrives while paused is held until
//! resume), and once after the last step (so a health warning raised in the
//! final year still parks the run). Cancellation is cooperative: an
//! in-flight call is raced against the cancellation signal and its late
//! result is dropped.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chronoweave_arcs::application::tracker::ArcTracker;
use chronoweave_arcs::domain::arc::CharacterArc;
use chronoweave_core::cancel::CancellationSignal;
use chronoweave_core::clock::Clock;
use chronoweave_core::event::{Importance, NarrativeEvent, TimelinePoint};
use chronoweave_core::generator::{
    CharacterMetrics, GenerationOutput, GenerationRequest, GeneratorError, NarrativeGenerator,
};
use chronoweave_core::rng::DeterministicRng;
use chronoweave_health::application::monitor::{HealthInput, evaluate};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::stream::{EmitError, ProgressSender};
use crate::domain::config::{BatchMode, CharacterSeed, SimulationRequest};
use crate::domain::progress::{FinalState, ProgressEvent, RunMetrics};
use crate::domain::run::{CharacterSnapshot, PauseCause, RunStatus, SimulationRun};
use crate::domain::session::{CancelReason, Session};
use crate::domain::timeline::Timeline;

/// Events of context handed to the generator and the health monitor.
pub const RECENT_EVENT_WINDOW: usize = 24;

/// Retry schedule for retryable generator failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per step, the first included.
    pub max_attempts: u32,
    /// Delay ceiling after the first failure.
    pub base_backoff: Duration,
    /// Upper bound on any delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based). The ceiling doubles
    /// per attempt up to `max_backoff`; the delay is drawn from its upper half.
    pub fn backoff(&self, attempt: u32, rng: &mut dyn DeterministicRng) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff);
        let ceiling_ms = u32::try_from(ceiling.as_millis()).unwrap_or(u32::MAX);
        Duration::from_millis(u64::from(rng.next_u32_range(ceiling_ms / 2, ceiling_ms)))
    }
}

/// Tunables for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Health-monitor cadence in simulated years.
    pub health_check_every_years: u32,
    /// Longest the engine sleeps between flag checks while parked.
    pub pause_poll_interval: Duration,
    /// Generator retry schedule.
    pub retry: RetryPolicy,
    /// Recent events handed to the generator and the health monitor.
    pub recent_event_window: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            health_check_every_years: 1,
            pause_poll_interval: Duration::from_millis(250),
            retry: RetryPolicy::default(),
            recent_event_window: RECENT_EVENT_WINDOW,
        }
    }
}

/// A finished run: the finalized record and the state for its terminal frame.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The finalized run record.
    pub run: SimulationRun,
    /// Aggregate state at the end of the run.
    pub state: FinalState,
    /// The failure that ended an errored run.
    pub failure: Option<String>,
}

impl RunOutcome {
    /// `error` for errored runs, `final_state` otherwise.
    #[must_use]
    pub fn terminal_frame(&self) -> ProgressEvent {
        match &self.failure {
            Some(message) => ProgressEvent::Error {
                message: message.clone(),
                state: self.state.clone(),
            },
            None => ProgressEvent::FinalState(self.state.clone()),
        }
    }
}

/// Why the loop stopped early.
enum Stop {
    Cancelled,
    Failed(String),
}

/// Mutable state of one run.
struct RunContext<'a> {
    session: &'a Session,
    progress: &'a ProgressSender,
    cancel: CancellationSignal,
    run: SimulationRun,
    cast: Vec<CharacterSeed>,
    seeded: HashSet<String>,
    world: serde_json::Value,
    tracker: ArcTracker,
    events: Vec<NarrativeEvent>,
    seeded_events: usize,
    event_ids: HashSet<String>,
    latest_metrics: BTreeMap<String, CharacterMetrics>,
    metrics: RunMetrics,
    final_year: Option<i32>,
}

impl<'a> RunContext<'a> {
    fn new(
        session: &'a Session,
        progress: &'a ProgressSender,
        run: SimulationRun,
        request: SimulationRequest,
        total_steps: usize,
    ) -> Self {
        let cast = request.cast();
        let seeded = request.characters.iter().map(|c| c.id.clone()).collect();
        let event_ids = request.events.iter().map(|e| e.id.clone()).collect();
        Self {
            session,
            progress,
            cancel: session.cancellation(),
            run,
            cast,
            seeded,
            world: request.world,
            tracker: ArcTracker::new(request.character_arcs, request.master_arc),
            seeded_events: request.events.len(),
            events: request.events,
            event_ids,
            latest_metrics: BTreeMap::new(),
            metrics: RunMetrics {
                total_steps,
                ..RunMetrics::default()
            },
            final_year: None,
        }
    }

    fn recent_events(&self, window: usize) -> &[NarrativeEvent] {
        &self.events[self.events.len().saturating_sub(window)..]
    }

    fn active_at(&self, year: i32) -> Vec<CharacterSeed> {
        self.cast
            .iter()
            .filter(|c| c.is_active_in(year))
            .cloned()
            .collect()
    }

    /// Undoes the newest append when its frame never reached the stream.
    fn retract_last_event(&mut self) {
        if let Some(event) = self.events.pop() {
            self.event_ids.remove(&event.id);
            self.metrics.events_generated = self.metrics.events_generated.saturating_sub(1);
        }
    }

    fn ensure_live(&self) -> Result<(), Stop> {
        if self.cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        if self.progress.is_closed() {
            self.session.cancel(CancelReason::ClientDisconnected);
            return Err(Stop::Cancelled);
        }
        Ok(())
    }

    async fn emit(&self, event: ProgressEvent) -> Result<(), Stop> {
        match self.progress.emit_unless_cancelled(event, &self.cancel).await {
            Ok(()) => Ok(()),
            Err(EmitError::Cancelled) => Err(Stop::Cancelled),
            Err(EmitError::Disconnected) => {
                self.session.cancel(CancelReason::ClientDisconnected);
                Err(Stop::Cancelled)
            }
        }
    }

    /// Rejects output that contradicts the request and assigns fresh ids to
    /// events whose id is blank or already taken.
    fn normalize(
        &self,
        mut output: GenerationOutput,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GeneratorError> {
        let point = request.point;
        let mut batch_ids = HashSet::new();
        for event in &mut output.events {
            if !request.includes_character(&event.character_id) {
                return Err(GeneratorError::Malformed(format!(
                    "event '{}' is attributed to '{}', who was not part of the request",
                    event.title, event.character_id
                )));
            }
            if event.year != point.year || !point.admits(event.season) {
                return Err(GeneratorError::Malformed(format!(
                    "event '{}' is dated {} {} but the step is {point}",
                    event.title, event.season, event.year
                )));
            }
            if event.title.trim().is_empty() {
                return Err(GeneratorError::Malformed(format!(
                    "event for '{}' has a blank title",
                    event.character_id
                )));
            }
            if let Some(unknown) = event
                .related_characters
                .iter()
                .find(|id| !self.seeded.contains(id.as_str()))
            {
                return Err(GeneratorError::Malformed(format!(
                    "event '{}' relates unknown character '{unknown}'",
                    event.title
                )));
            }
            if event.id.trim().is_empty()
                || self.event_ids.contains(&event.id)
                || !batch_ids.insert(event.id.clone())
            {
                event.id = format!("evt-{}", Uuid::new_v4());
                batch_ids.insert(event.id.clone());
            }
        }
        for metrics in &mut output.metrics {
            metrics.theme_alignment = metrics.theme_alignment.min(100);
            metrics.interest = metrics.interest.min(100);
        }
        Ok(output)
    }
}

/// Orchestrates runs against an injected generator.
pub struct SimulationEngine {
    generator: Arc<dyn NarrativeGenerator>,
    clock: Arc<dyn Clock + Send + Sync>,
    rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    settings: EngineSettings,
}

impl SimulationEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        generator: Arc<dyn NarrativeGenerator>,
        clock: Arc<dyn Clock + Send + Sync>,
        rng: Arc<Mutex<dyn DeterministicRng + Send>>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            generator,
            clock,
            rng,
            settings,
        }
    }

    /// The engine's tunables.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs `request` to a terminal state, emitting progress through
    /// `progress`. Never fails: cancellation and generator failures are
    /// folded into the returned outcome.
    pub async fn run_full_simulation(
        &self,
        session: &Session,
        run: SimulationRun,
        request: SimulationRequest,
        progress: &ProgressSender,
    ) -> RunOutcome {
        let timeline = Timeline::new(&request.config);
        let mode = request.config.batch_mode;
        let mut ctx = RunContext::new(session, progress, run, request, timeline.total_steps());

        let result = match ctx.run.transition(RunStatus::Running) {
            Ok(()) => {
                info!(
                    start_year = ctx.run.config.start_year,
                    end_year = ctx.run.config.end_year,
                    ?mode,
                    characters = ctx.cast.len(),
                    total_steps = ctx.metrics.total_steps,
                    "simulation started"
                );
                self.drive(&mut ctx, &timeline).await
            }
            Err(err) => Err(Stop::Failed(err.to_string())),
        };
        self.finalize(ctx, result)
    }

    async fn drive(&self, ctx: &mut RunContext<'_>, timeline: &Timeline) -> Result<(), Stop> {
        let cadence = self.settings.health_check_every_years.max(1);
        for update in ctx.tracker.take_seed_updates() {
            ctx.emit(ProgressEvent::ArcUpdate { update }).await?;
        }
        for point in timeline.points() {
            self.checkpoint(ctx).await?;

            let active = ctx.active_at(point.year);
            if active.is_empty() {
                debug!(%point, "no active characters; step skipped");
            } else {
                match ctx.run.config.batch_mode {
                    BatchMode::Quality => {
                        for character in &active {
                            self.step(ctx, point, std::slice::from_ref(character)).await?;
                        }
                    }
                    BatchMode::Speed => self.step(ctx, point, &active).await?,
                }
            }

            ctx.metrics.steps_completed += 1;
            ctx.final_year = Some(point.year);
            ctx.emit(ProgressEvent::StepComplete {
                point,
                steps_completed: ctx.metrics.steps_completed,
                total_steps: ctx.metrics.total_steps,
            })
            .await?;

            if Timeline::ends_year(point) && timeline.years_elapsed(point.year) % cadence == 0 {
                self.check_health(ctx, point.year).await?;
            }
        }
        self.checkpoint(ctx).await
    }

    async fn step(
        &self,
        ctx: &mut RunContext<'_>,
        point: TimelinePoint,
        characters: &[CharacterSeed],
    ) -> Result<(), Stop> {
        let request = self.request_for(ctx, point, characters);
        let output = self.generate(ctx, request).await?;
        self.checkpoint(ctx).await?;
        self.apply(ctx, point, output).await
    }

    fn request_for(
        &self,
        ctx: &RunContext<'_>,
        point: TimelinePoint,
        characters: &[CharacterSeed],
    ) -> GenerationRequest {
        GenerationRequest {
            run_id: ctx.run.run_id.clone(),
            point,
            attempt: 1,
            characters: characters.iter().map(CharacterSeed::context).collect(),
            arcs: characters
                .iter()
                .filter_map(|c| ctx.tracker.context_for(&c.id))
                .collect(),
            master_arc: ctx.tracker.master_context(),
            recent_events: ctx.recent_events(self.settings.recent_event_window).to_vec(),
            world: ctx.world.clone(),
        }
    }

    async fn generate(
        &self,
        ctx: &mut RunContext<'_>,
        mut request: GenerationRequest,
    ) -> Result<GenerationOutput, Stop> {
        let max_attempts = self.settings.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.checkpoint(ctx).await?;
            request.attempt = attempt;
            ctx.metrics.generator_calls += 1;

            let result = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => return Err(Stop::Cancelled),
                result = self.generator.generate(&request, &ctx.cancel) => result,
            };
            let error = match result.and_then(|output| ctx.normalize(output, &request)) {
                Ok(output) => return Ok(output),
                Err(GeneratorError::Cancelled) if ctx.cancel.is_cancelled() => {
                    return Err(Stop::Cancelled);
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                warn!(attempt, %error, point = %request.point, "generator failed; giving up");
                return Err(Stop::Failed(error.to_string()));
            }

            let delay = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                self.settings.retry.backoff(attempt, &mut *rng)
            };
            warn!(
                attempt,
                %error,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "generator call failed; retrying"
            );
            ctx.metrics.retries += 1;
            tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => return Err(Stop::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn apply(
        &self,
        ctx: &mut RunContext<'_>,
        point: TimelinePoint,
        output: GenerationOutput,
    ) -> Result<(), Stop> {
        let GenerationOutput {
            mut events,
            beat_progress,
            tension,
            master_tension,
            metrics,
        } = output;

        if point.season.is_none() {
            events.sort_by_key(|e| e.season);
        }
        for event in events {
            ctx.ensure_live()?;
            ctx.event_ids.insert(event.id.clone());
            ctx.events.push(event.clone());
            ctx.metrics.events_generated += 1;
            if let Err(stop) = ctx.emit(ProgressEvent::Narrative { event }).await {
                ctx.retract_last_event();
                return Err(stop);
            }
        }

        let mut updates = ctx.tracker.apply_beats(&beat_progress);
        updates.extend(ctx.tracker.apply_tension(&tension, master_tension));
        for update in updates {
            ctx.emit(ProgressEvent::ArcUpdate { update }).await?;
        }

        for reading in metrics {
            if ctx.cast.iter().any(|c| c.id == reading.character_id) {
                ctx.latest_metrics.insert(reading.character_id.clone(), reading);
            }
        }
        Ok(())
    }

    async fn check_health(&self, ctx: &mut RunContext<'_>, year: i32) -> Result<(), Stop> {
        ctx.metrics.health_checks += 1;
        let active: Vec<String> = ctx.active_at(year).into_iter().map(|c| c.id).collect();
        let metrics: Vec<CharacterMetrics> = ctx.latest_metrics.values().cloned().collect();
        let warning = evaluate(&HealthInput {
            arcs: ctx.tracker.arcs(),
            master_arc: ctx.tracker.master(),
            recent_events: ctx.recent_events(self.settings.recent_event_window),
            metrics: &metrics,
            active_characters: &active,
        });

        let Some(warning) = warning else {
            debug!(year, "storyline healthy");
            return Ok(());
        };
        ctx.metrics.warnings_raised += 1;
        warn!(
            year,
            theme_alignment = warning.overall_theme_alignment,
            interest = warning.overall_interest,
            "storyline health warning; pausing for review"
        );
        ctx.session.pause(PauseCause::HealthWarning);
        ctx.emit(ProgressEvent::Warning { warning }).await
    }

    /// Stops on cancellation; parks while the pause flag is set.
    async fn checkpoint(&self, ctx: &mut RunContext<'_>) -> Result<(), Stop> {
        ctx.ensure_live()?;
        let Some(cause) = ctx.session.pause_cause() else {
            return Ok(());
        };

        ctx.run
            .pause(cause)
            .map_err(|err| Stop::Failed(err.to_string()))?;
        info!(?cause, "run paused");
        ctx.emit(ProgressEvent::Status {
            status: RunStatus::Paused,
            pause_cause: Some(cause),
        })
        .await?;

        let mut changes = ctx.session.pause_changes();
        while ctx.session.is_paused() {
            tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => return Err(Stop::Cancelled),
                () = ctx.progress.closed() => {
                    ctx.session.cancel(CancelReason::ClientDisconnected);
                    return Err(Stop::Cancelled);
                }
                _ = changes.changed() => {}
                () = tokio::time::sleep(self.settings.pause_poll_interval) => {}
            }
        }

        ctx.ensure_live()?;
        ctx.run
            .resume()
            .map_err(|err| Stop::Failed(err.to_string()))?;
        info!("run resumed");
        ctx.emit(ProgressEvent::Status {
            status: RunStatus::Running,
            pause_cause: None,
        })
        .await
    }

    fn finalize(&self, ctx: RunContext<'_>, result: Result<(), Stop>) -> RunOutcome {
        let (status, abort_reason, failure) = match result {
            Ok(()) => (RunStatus::Completed, None, None),
            Err(Stop::Cancelled) => {
                let reason = ctx
                    .session
                    .cancel_reason()
                    .unwrap_or(CancelReason::UserAbort);
                (RunStatus::Aborted, Some(reason.to_string()), None)
            }
            Err(Stop::Failed(message)) => (RunStatus::Errored, None, Some(message)),
        };

        let RunContext {
            mut run,
            cast,
            tracker,
            events,
            seeded_events,
            metrics,
            final_year,
            ..
        } = ctx;

        let elapsed_ms = u64::try_from(self.clock.elapsed_since(run.started_at).as_millis())
            .unwrap_or(u64::MAX);
        match status {
            RunStatus::Completed => info!(
                events_generated = metrics.events_generated,
                steps = metrics.steps_completed,
                elapsed_ms,
                "simulation completed"
            ),
            RunStatus::Aborted => info!(
                reason = abort_reason.as_deref().unwrap_or_default(),
                steps = metrics.steps_completed,
                elapsed_ms,
                "simulation aborted"
            ),
            _ => error!(
                failure = failure.as_deref().unwrap_or_default(),
                steps = metrics.steps_completed,
                elapsed_ms,
                "simulation errored"
            ),
        }

        let (character_arcs, master_arc) = tracker.into_parts();
        let characters = snapshots(&cast, &character_arcs, &events);
        let integrated_storyline = storyline(&events[seeded_events..]);

        if let Err(err) = run.finish(status, self.clock.now()) {
            warn!(%err, "run record could not be finalized");
        }
        run.final_year = final_year;
        run.character_snapshots = characters
            .iter()
            .map(|s| (s.character_id.clone(), s.clone()))
            .collect();
        run.integrated_storyline.clone_from(&integrated_storyline);
        run.abort_reason.clone_from(&abort_reason);
        run.failure.clone_from(&failure);

        let state = FinalState {
            run_id: run.run_id.clone(),
            status,
            characters,
            character_arcs,
            master_arc,
            metrics,
            final_year,
            abort_reason,
            integrated_storyline,
        };
        RunOutcome {
            run,
            state,
            failure,
        }
    }
}

fn snapshots(
    cast: &[CharacterSeed],
    arcs: &[CharacterArc],
    events: &[NarrativeEvent],
) -> Vec<CharacterSnapshot> {
    cast.iter()
        .map(|character| {
            let arc = arcs.iter().find(|a| a.character_id == character.id);
            let own: Vec<&NarrativeEvent> = events
                .iter()
                .filter(|e| e.character_id == character.id)
                .collect();
            CharacterSnapshot {
                character_id: character.id.clone(),
                name: character.name.clone(),
                phase_name: arc.and_then(CharacterArc::phase).map(|p| p.name.clone()),
                tension: arc.map_or(0, |a| a.tension),
                fulfillment: arc.map_or(0, |a| a.fulfillment),
                event_count: own.len(),
                last_event_title: own.last().map(|e| e.title.clone()),
            }
        })
        .collect()
}

/// Titles of the turning points among `events`, in timeline order.
fn storyline(events: &[NarrativeEvent]) -> Option<String> {
    let mut turning_points: Vec<&NarrativeEvent> = events
        .iter()
        .filter(|e| e.importance == Importance::TurningPoint)
        .collect();
    if turning_points.is_empty() {
        return None;
    }
    turning_points.sort_by_key(|e| e.point());
    Some(
        turning_points
            .iter()
            .map(|e| e.title.as_str())
            .collect::<Vec<_>>()
            .join("; "),
    )
}
