//! Journey data model: scripted station sequences advanced by feedback

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

/// What happens when a journey reaches its final station.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfRoute {
    /// Park the journey; further feedback is ignored until a reset.
    #[default]
    None,
    /// Reset position to the first station and keep running.
    BeginAgainFromFirstStop,
    /// Hand off to the configured successor journey.
    GotoJourney,
}

/// A stop along a journey. The train halts here after `laps_to_stop`
/// matching feedback events, then the attached workflow runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: Uuid,
    pub name: String,
    /// Feedback events required before this station counts as reached.
    pub laps_to_stop: u32,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub exit_on_left: bool,
    /// Workflow executed on arrival, if any.
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
}

impl Station {
    pub fn new(name: &str, laps_to_stop: u32) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            laps_to_stop,
            track_number: 0,
            exit_on_left: false,
            workflow_id: None,
        }
    }

    pub fn with_workflow(mut self, workflow_id: Uuid) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    pub fn with_track(mut self, track_number: u32) -> Self {
        self.track_number = track_number;
        self
    }
}

/// A scripted train route: an ordered station list bound to one feedback
/// channel. Static configuration; runtime progress lives in
/// [`JourneySessionState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    pub id: Uuid,
    pub name: String,
    /// Feedback channel that advances this journey.
    pub channel: u16,
    pub stations: Vec<Station>,
    /// Index of the station the journey starts at.
    #[serde(default)]
    pub first_stop: usize,
    #[serde(default)]
    pub end_of_route: EndOfRoute,
    /// Successor for [`EndOfRoute::GotoJourney`].
    #[serde(default)]
    pub next_journey_id: Option<Uuid>,
    /// Announcement template. Placeholders are substituted per station.
    #[serde(default)]
    pub template_text: Option<String>,
    /// Ignore repeated feedbacks arriving within this many seconds.
    #[serde(default)]
    pub feedback_debounce_secs: Option<f64>,
}

impl Journey {
    pub fn new(name: &str, channel: u16, stations: Vec<Station>) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            channel,
            stations,
            first_stop: 0,
            end_of_route: EndOfRoute::None,
            next_journey_id: None,
            template_text: None,
            feedback_debounce_secs: None,
        }
    }

    pub fn with_end_of_route(mut self, behavior: EndOfRoute) -> Self {
        self.end_of_route = behavior;
        self
    }

    pub fn with_next_journey(mut self, next: Uuid) -> Self {
        self.end_of_route = EndOfRoute::GotoJourney;
        self.next_journey_id = Some(next);
        self
    }

    pub fn with_template(mut self, text: &str) -> Self {
        self.template_text = Some(text.to_string());
        self
    }

    pub fn with_debounce(mut self, secs: f64) -> Self {
        self.feedback_debounce_secs = Some(secs);
        self
    }
}

/// Journey execution phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyPhase {
    /// No feedback received yet.
    #[default]
    Idle,
    /// Position advances as matching feedback arrives.
    Running,
    /// Final station reached; end-of-route behavior applied.
    AtLastStop,
}

impl JourneyPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JourneyPhase::Idle => "idle",
            JourneyPhase::Running => "running",
            JourneyPhase::AtLastStop => "at_last_stop",
        }
    }
}

/// Runtime state for one journey. Separate from the static [`Journey`]
/// configuration so sessions can be reset without touching config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneySessionState {
    pub journey_id: Uuid,
    /// Feedback events counted toward the current station.
    pub counter: u32,
    /// Index into the journey's station list.
    pub station_index: usize,
    /// Name of the last station reached; empty until the first stop.
    pub current_station_name: String,
    pub phase: JourneyPhase,
    /// False once the journey is parked at its final station.
    pub active: bool,
}

impl JourneySessionState {
    pub fn new(journey_id: Uuid, first_stop: usize) -> Self {
        Self {
            journey_id,
            counter: 0,
            station_index: first_stop,
            current_station_name: String::new(),
            phase: JourneyPhase::Idle,
            active: true,
        }
    }

    /// Reset to initial values at the given starting position.
    pub fn reset(&mut self, first_stop: usize) {
        self.counter = 0;
        self.station_index = first_stop;
        self.current_station_name.clear();
        self.phase = JourneyPhase::Idle;
        self.active = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_journey_defaults() {
        let journey = Journey::new("Shuttle", 5, vec![Station::new("Central", 1)]);

        assert!(!journey.id.is_nil());
        assert_eq!(journey.channel, 5);
        assert_eq!(journey.first_stop, 0);
        assert_eq!(journey.end_of_route, EndOfRoute::None);
        assert!(journey.next_journey_id.is_none());
        assert!(journey.feedback_debounce_secs.is_none());
    }

    #[test]
    fn test_with_next_journey_sets_behavior() {
        let next = new_id();
        let journey = Journey::new("Loop", 3, vec![]).with_next_journey(next);

        assert_eq!(journey.end_of_route, EndOfRoute::GotoJourney);
        assert_eq!(journey.next_journey_id, Some(next));
    }

    #[test]
    fn test_session_state_reset() {
        let journey_id = new_id();
        let mut state = JourneySessionState::new(journey_id, 0);
        state.counter = 4;
        state.station_index = 2;
        state.current_station_name = "Terminus".to_string();
        state.phase = JourneyPhase::AtLastStop;
        state.active = false;

        state.reset(0);

        assert_eq!(state.counter, 0);
        assert_eq!(state.station_index, 0);
        assert!(state.current_station_name.is_empty());
        assert_eq!(state.phase, JourneyPhase::Idle);
        assert!(state.active);
    }

    #[test]
    fn test_journey_round_trips_through_json() {
        let journey = Journey::new("Shuttle", 7, vec![Station::new("East", 2).with_track(3)])
            .with_end_of_route(EndOfRoute::BeginAgainFromFirstStop)
            .with_template("Next stop {StationName}")
            .with_debounce(2.5);

        let json = serde_json::to_string(&journey).unwrap();
        let parsed: Journey = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, journey);
        assert!(json.contains("begin_again_from_first_stop"));
    }
}
