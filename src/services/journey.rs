//! Journey state tracking and feedback fan-out
//!
//! [`JourneyRunner`] is the per-journey state machine: it owns the
//! journey's mutable counters exclusively, so independent journeys on
//! different channels advance without shared locks. [`JourneyDirector`]
//! owns all runners, routes feedback to them, executes station
//! workflows, and resolves cross-journey hand-offs.

use crate::domain::journey::{
    EndOfRoute, Journey, JourneyPhase, JourneySessionState, Station,
};
use crate::domain::types::FeedbackEvent;
use crate::domain::workflow::Workflow;
use crate::infra::events::EventHub;
use crate::services::actions::ExecutionContext;
use crate::services::monitor::FeedbackMonitor;
use crate::services::workflow::{ActionFailure, WorkflowEngine};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Raised when a journey reaches a new station, in order, never
/// skipping a configured stop.
#[derive(Debug, Clone)]
pub struct StationChangedEvent {
    pub journey_id: Uuid,
    pub journey_name: String,
    pub station: Station,
    pub state: JourneySessionState,
}

/// Raised on every matching feedback, whether or not a station was
/// reached.
#[derive(Debug, Clone)]
pub struct JourneyFeedbackEvent {
    pub journey_id: Uuid,
    pub state: JourneySessionState,
}

/// What happened at the final station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfRouteOutcome {
    /// Journey parked; further feedback is ignored until a reset.
    Parked,
    /// Position returned to the first station, journey keeps running.
    Restarted,
    /// Pure transition: the successor must be activated by the caller.
    Handoff { next: Uuid },
}

pub(crate) struct ReachedStop {
    pub index: usize,
    pub station: Station,
    pub state: JourneySessionState,
    pub end_of_route: Option<EndOfRouteOutcome>,
}

pub(crate) struct FeedbackOutcome {
    /// State right after counting, for the unconditional feedback event.
    pub feedback_state: JourneySessionState,
    pub reached: Option<ReachedStop>,
}

/// Per-journey state machine: Idle until the first feedback, Running
/// while the position advances, AtLastStop once the final station fires
/// its configured behavior.
pub struct JourneyRunner {
    journey: Journey,
    state: JourneySessionState,
    last_feedback: Option<Instant>,
}

impl JourneyRunner {
    pub fn new(journey: Journey) -> Self {
        let state = JourneySessionState::new(journey.id, journey.first_stop);
        Self { journey, state, last_feedback: None }
    }

    pub fn journey(&self) -> &Journey {
        &self.journey
    }

    pub fn state(&self) -> &JourneySessionState {
        &self.state
    }

    /// Force Idle at the starting position, unconditionally. Debounce
    /// state is cleared so a resumed session reacts to the very next
    /// feedback without delay.
    pub fn reset(&mut self) {
        self.state.reset(self.journey.first_stop);
        self.last_feedback = None;
        debug!(journey = %self.journey.name, "journey_reset");
    }

    /// Activate as a hand-off target: position moves to the first stop
    /// and the journey runs again.
    pub(crate) fn activate(&mut self) {
        self.state.station_index = self.journey.first_stop;
        self.state.active = true;
        self.state.phase = JourneyPhase::Running;
    }

    fn is_debounced(&self, now: Instant) -> bool {
        let (Some(debounce_secs), Some(last)) =
            (self.journey.feedback_debounce_secs, self.last_feedback)
        else {
            return false;
        };
        now.duration_since(last) < Duration::from_secs_f64(debounce_secs.max(0.0))
    }

    /// Process one matching feedback. Returns None when the journey is
    /// parked or the feedback falls inside the debounce window.
    pub(crate) fn on_feedback(&mut self, now: Instant) -> Option<FeedbackOutcome> {
        if !self.state.active {
            debug!(journey = %self.journey.name, "feedback_ignored_parked");
            return None;
        }
        if self.is_debounced(now) {
            debug!(journey = %self.journey.name, "feedback_ignored_debounce");
            return None;
        }

        self.state.counter += 1;
        if self.state.phase == JourneyPhase::Idle {
            self.state.phase = JourneyPhase::Running;
        }
        let feedback_state = self.state.clone();

        let reached = if self.state.station_index >= self.journey.stations.len() {
            warn!(
                journey = %self.journey.name,
                station_index = self.state.station_index,
                "station_index_out_of_bounds"
            );
            None
        } else {
            let station = self.journey.stations[self.state.station_index].clone();
            if self.state.counter >= station.laps_to_stop {
                let index = self.state.station_index;
                self.state.current_station_name = station.name.clone();
                self.state.counter = 0;

                let is_last = index == self.journey.stations.len() - 1;
                let end_of_route = if is_last {
                    Some(self.apply_end_of_route())
                } else {
                    self.state.station_index += 1;
                    None
                };

                Some(ReachedStop { index, station, state: self.state.clone(), end_of_route })
            } else {
                None
            }
        };

        // The debounce clock updates after processing, so the first
        // feedback always counts and later ones fall in the window.
        self.last_feedback = Some(now);

        Some(FeedbackOutcome { feedback_state, reached })
    }

    fn apply_end_of_route(&mut self) -> EndOfRouteOutcome {
        self.state.phase = JourneyPhase::AtLastStop;

        match self.journey.end_of_route {
            EndOfRoute::None => {
                self.state.active = false;
                EndOfRouteOutcome::Parked
            }
            EndOfRoute::BeginAgainFromFirstStop => {
                self.state.station_index = 0;
                self.state.phase = JourneyPhase::Running;
                EndOfRouteOutcome::Restarted
            }
            EndOfRoute::GotoJourney => match self.journey.next_journey_id {
                Some(next) => EndOfRouteOutcome::Handoff { next },
                None => {
                    warn!(journey = %self.journey.name, "goto_journey_without_successor");
                    self.state.active = false;
                    EndOfRouteOutcome::Parked
                }
            },
        }
    }
}

struct StandaloneTrigger {
    workflow_id: Uuid,
    channel: u16,
    debounce: Option<Duration>,
    last_feedback: Option<Instant>,
}

struct JourneyWork {
    journey_id: Uuid,
    journey_name: String,
    template_text: Option<String>,
    outcome: FeedbackOutcome,
}

/// Routes feedback to journey runners and standalone feedback-triggered
/// workflows, executes station workflows, records statistics, and
/// resolves hand-offs between journeys.
pub struct JourneyDirector {
    runners: Mutex<HashMap<Uuid, JourneyRunner>>,
    workflows: HashMap<Uuid, Workflow>,
    standalone: Mutex<Vec<StandaloneTrigger>>,
    engine: WorkflowEngine,
    monitor: Arc<FeedbackMonitor>,
    context: ExecutionContext,
    station_changed: EventHub<StationChangedEvent>,
    feedback_received: EventHub<JourneyFeedbackEvent>,
}

impl JourneyDirector {
    pub fn new(
        journeys: Vec<Journey>,
        workflows: Vec<Workflow>,
        monitor: Arc<FeedbackMonitor>,
        context: ExecutionContext,
    ) -> Self {
        let runners = journeys
            .into_iter()
            .map(|journey| (journey.id, JourneyRunner::new(journey)))
            .collect();

        let standalone = workflows
            .iter()
            .filter_map(|workflow| {
                workflow.channel.map(|channel| StandaloneTrigger {
                    workflow_id: workflow.id,
                    channel,
                    debounce: workflow
                        .feedback_debounce_secs
                        .map(|secs| Duration::from_secs_f64(secs.max(0.0))),
                    last_feedback: None,
                })
            })
            .collect();

        let workflows = workflows.into_iter().map(|w| (w.id, w)).collect();

        Self {
            runners: Mutex::new(runners),
            workflows,
            standalone: Mutex::new(standalone),
            engine: WorkflowEngine::new(),
            monitor,
            context,
            station_changed: EventHub::new(),
            feedback_received: EventHub::new(),
        }
    }

    pub fn station_changed(&self) -> &EventHub<StationChangedEvent> {
        &self.station_changed
    }

    pub fn feedback_received(&self) -> &EventHub<JourneyFeedbackEvent> {
        &self.feedback_received
    }

    pub fn action_failures(&self) -> &EventHub<ActionFailure> {
        self.engine.failures()
    }

    pub fn state(&self, journey_id: Uuid) -> Option<JourneySessionState> {
        self.runners.lock().get(&journey_id).map(|runner| runner.state().clone())
    }

    /// Force one journey back to Idle at its starting position.
    pub fn reset(&self, journey_id: Uuid) -> bool {
        match self.runners.lock().get_mut(&journey_id) {
            Some(runner) => {
                runner.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for runner in self.runners.lock().values_mut() {
            runner.reset();
        }
        for trigger in self.standalone.lock().iter_mut() {
            trigger.last_feedback = None;
        }
        info!("all_journeys_reset");
    }

    /// Consume feedback events until the channel closes.
    pub async fn run(self, mut events: mpsc::Receiver<FeedbackEvent>) {
        info!("journey_director_started");
        while let Some(event) = events.recv().await {
            self.handle_feedback(&event).await;
        }
        info!("journey_director_stopped");
    }

    /// Process one feedback event: statistics, journey advancement,
    /// station workflows, hand-offs, standalone workflow triggers.
    pub async fn handle_feedback(&self, event: &FeedbackEvent) {
        let now = Instant::now();

        self.record_statistics(event);

        let work = {
            let mut runners = self.runners.lock();
            let mut work = Vec::new();
            for runner in
                runners.values_mut().filter(|r| r.journey().channel == event.channel)
            {
                if let Some(outcome) = runner.on_feedback(now) {
                    work.push(JourneyWork {
                        journey_id: runner.journey().id,
                        journey_name: runner.journey().name.clone(),
                        template_text: runner.journey().template_text.clone(),
                        outcome,
                    });
                }
            }
            work
        };

        for item in work {
            self.feedback_received.publish(&JourneyFeedbackEvent {
                journey_id: item.journey_id,
                state: item.outcome.feedback_state,
            });

            let Some(reached) = item.outcome.reached else {
                continue;
            };

            info!(
                journey = %item.journey_name,
                station = %reached.station.name,
                "station_reached"
            );
            self.station_changed.publish(&StationChangedEvent {
                journey_id: item.journey_id,
                journey_name: item.journey_name.clone(),
                station: reached.station.clone(),
                state: reached.state.clone(),
            });

            if let Some(workflow_id) = reached.station.workflow_id {
                match self.workflows.get(&workflow_id) {
                    Some(workflow) => {
                        let context = self.context.for_station(
                            &reached.station,
                            reached.index + 1,
                            item.template_text.as_deref(),
                        );
                        self.engine.execute(workflow, &context).await;
                    }
                    None => warn!(workflow_id = %workflow_id, "workflow_not_found"),
                }
            }

            match reached.end_of_route {
                Some(EndOfRouteOutcome::Handoff { next }) => {
                    let mut runners = self.runners.lock();
                    match runners.get_mut(&next) {
                        Some(successor) => {
                            successor.activate();
                            info!(
                                from = %item.journey_name,
                                to = %successor.journey().name,
                                position = successor.state().station_index,
                                "journey_handoff"
                            );
                        }
                        None => warn!(next = %next, "handoff_target_not_found"),
                    }
                }
                Some(EndOfRouteOutcome::Parked) => {
                    info!(journey = %item.journey_name, "journey_parked");
                }
                Some(EndOfRouteOutcome::Restarted) => {
                    info!(journey = %item.journey_name, "journey_restarted");
                }
                None => {}
            }
        }

        self.trigger_standalone_workflows(event, now).await;
    }

    fn record_statistics(&self, event: &FeedbackEvent) {
        let label = {
            let runners = self.runners.lock();
            runners
                .values()
                .find(|r| r.journey().channel == event.channel)
                .map(|r| (r.journey().name.clone(), "journey"))
                .or_else(|| {
                    self.standalone
                        .lock()
                        .iter()
                        .find(|t| t.channel == event.channel)
                        .and_then(|t| self.workflows.get(&t.workflow_id))
                        .map(|w| (w.name.clone(), "workflow"))
                })
        };

        match label {
            Some((name, kind)) => {
                self.monitor.record_feedback(event.channel, Some(name.as_str()), Some(kind))
            }
            None => self.monitor.record_feedback(event.channel, None, None),
        }
    }

    async fn trigger_standalone_workflows(&self, event: &FeedbackEvent, now: Instant) {
        let triggered: Vec<Uuid> = {
            let mut standalone = self.standalone.lock();
            standalone
                .iter_mut()
                .filter(|t| t.channel == event.channel)
                .filter_map(|t| {
                    let inside_window = match (t.debounce, t.last_feedback) {
                        (Some(window), Some(last)) => now.duration_since(last) < window,
                        _ => false,
                    };
                    if inside_window {
                        debug!(workflow_id = %t.workflow_id, "workflow_trigger_debounced");
                        return None;
                    }
                    t.last_feedback = Some(now);
                    Some(t.workflow_id)
                })
                .collect()
        };

        for workflow_id in triggered {
            if let Some(workflow) = self.workflows.get(&workflow_id) {
                info!(workflow = %workflow.name, channel = event.channel, "workflow_triggered");
                self.engine.execute(workflow, &self.context).await;
            }
        }
    }
}

/// Bridge the client's feedback hub into a channel the director can
/// consume. Events that overflow the queue are dropped with a warning.
pub fn forward_feedback(
    client: &crate::services::client::CommandStationClient,
    capacity: usize,
) -> mpsc::Receiver<FeedbackEvent> {
    let (tx, rx) = mpsc::channel(capacity);
    client.feedback().subscribe(move |event: &FeedbackEvent| {
        if let Err(e) = tx.try_send(event.clone()) {
            warn!(error = %e, "feedback_queue_full_dropping");
        }
    });
    rx
}

#[cfg(test)]
mod runner_tests {
    use super::*;
    use crate::domain::journey::Station;

    fn three_stop_journey(end_of_route: EndOfRoute) -> Journey {
        Journey::new(
            "Shuttle",
            5,
            vec![Station::new("S1", 1), Station::new("S2", 1), Station::new("S3", 1)],
        )
        .with_end_of_route(end_of_route)
    }

    fn feed(runner: &mut JourneyRunner, now: Instant) -> Option<FeedbackOutcome> {
        runner.on_feedback(now)
    }

    #[test]
    fn test_stations_fire_in_order_and_wrap_without_skipping() {
        let mut runner =
            JourneyRunner::new(three_stop_journey(EndOfRoute::BeginAgainFromFirstStop));
        let now = Instant::now();

        let mut reached = Vec::new();
        for _ in 0..6 {
            let outcome = feed(&mut runner, now).unwrap();
            reached.push(outcome.reached.unwrap().station.name);
        }

        assert_eq!(reached, vec!["S1", "S2", "S3", "S1", "S2", "S3"]);
        assert!(runner.state().active);
    }

    #[test]
    fn test_counter_respects_laps_to_stop() {
        let journey = Journey::new("Laps", 2, vec![Station::new("Only", 3)]);
        let mut runner = JourneyRunner::new(journey);
        let now = Instant::now();

        assert!(feed(&mut runner, now).unwrap().reached.is_none());
        assert!(feed(&mut runner, now).unwrap().reached.is_none());
        let outcome = feed(&mut runner, now).unwrap();
        assert_eq!(outcome.feedback_state.counter, 3);
        assert!(outcome.reached.is_some());
        assert_eq!(runner.state().counter, 0);
    }

    #[test]
    fn test_feedback_event_fires_even_when_no_station_reached() {
        let journey = Journey::new("Laps", 2, vec![Station::new("Only", 5)]);
        let mut runner = JourneyRunner::new(journey);

        let outcome = feed(&mut runner, Instant::now()).unwrap();
        assert_eq!(outcome.feedback_state.counter, 1);
        assert_eq!(outcome.feedback_state.phase, JourneyPhase::Running);
        assert!(outcome.reached.is_none());
    }

    #[test]
    fn test_none_behavior_parks_the_journey() {
        let journey = Journey::new("Once", 5, vec![Station::new("End", 1)]);
        let mut runner = JourneyRunner::new(journey);
        let now = Instant::now();

        let outcome = feed(&mut runner, now).unwrap();
        assert_eq!(
            outcome.reached.unwrap().end_of_route,
            Some(EndOfRouteOutcome::Parked)
        );
        assert!(!runner.state().active);
        assert_eq!(runner.state().phase, JourneyPhase::AtLastStop);

        // Parked journeys ignore further feedback.
        assert!(feed(&mut runner, now).is_none());
    }

    #[test]
    fn test_goto_journey_is_a_pure_transition() {
        let next = crate::domain::journey::new_id();
        let journey =
            Journey::new("Feeder", 5, vec![Station::new("End", 1)]).with_next_journey(next);
        let mut runner = JourneyRunner::new(journey);

        let outcome = feed(&mut runner, Instant::now()).unwrap();
        assert_eq!(
            outcome.reached.unwrap().end_of_route,
            Some(EndOfRouteOutcome::Handoff { next })
        );
        // The runner itself does not touch the successor.
        assert!(runner.state().active);
    }

    #[test]
    fn test_goto_journey_without_successor_parks() {
        let mut journey = Journey::new("Broken", 5, vec![Station::new("End", 1)]);
        journey.end_of_route = EndOfRoute::GotoJourney;
        let mut runner = JourneyRunner::new(journey);

        let outcome = feed(&mut runner, Instant::now()).unwrap();
        assert_eq!(
            outcome.reached.unwrap().end_of_route,
            Some(EndOfRouteOutcome::Parked)
        );
        assert!(!runner.state().active);
    }

    #[test]
    fn test_debounce_window_ignores_rapid_feedback() {
        let journey = Journey::new("Bouncy", 5, vec![Station::new("S1", 3)]).with_debounce(10.0);
        let mut runner = JourneyRunner::new(journey);
        let t0 = Instant::now();

        assert!(feed(&mut runner, t0).is_some());
        assert!(feed(&mut runner, t0 + Duration::from_secs(1)).is_none());
        assert!(feed(&mut runner, t0 + Duration::from_secs(11)).is_some());
        assert_eq!(runner.state().counter, 2);
    }

    #[test]
    fn test_reset_clears_debounce_and_position() {
        let journey = Journey::new("Bouncy", 5, vec![Station::new("S1", 1), Station::new("S2", 1)])
            .with_debounce(3600.0);
        let mut runner = JourneyRunner::new(journey);
        let t0 = Instant::now();

        feed(&mut runner, t0).unwrap();
        assert_eq!(runner.state().station_index, 1);

        runner.reset();
        assert_eq!(runner.state().station_index, 0);
        assert_eq!(runner.state().phase, JourneyPhase::Idle);

        // Right after a reset the next feedback must count despite the
        // hour-long debounce window.
        let outcome = feed(&mut runner, t0 + Duration::from_millis(1)).unwrap();
        assert!(outcome.reached.is_some());
    }

    #[test]
    fn test_journey_without_stations_is_harmless() {
        let journey = Journey::new("Hollow", 5, vec![]);
        let mut runner = JourneyRunner::new(journey);

        let outcome = feed(&mut runner, Instant::now()).unwrap();
        assert!(outcome.reached.is_none());
        assert_eq!(outcome.feedback_state.counter, 1);
    }
}
