//! Action dispatch: executes a single workflow action by variant
//!
//! Speech and sound are optional platform backends behind trait seams.
//! A missing backend turns the action into a logged no-op so scripted
//! behavior degrades gracefully on headless installations.

use crate::domain::journey::Station;
use crate::domain::workflow::{Action, ActionKind};
use crate::io::transport::TransportError;
use crate::services::client::CommandStationClient;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Audio file played by [`ActionKind::Gong`].
pub const GONG_SOUND: &str = "sounds/gong.wav";

/// Text-to-speech backend for announcements.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), BackendError>;
}

/// Audio playback backend for sound files and the station chime.
#[async_trait]
pub trait SoundBackend: Send + Sync {
    async fn play(&self, file: &str) -> Result<(), BackendError>;
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("command send failed: {0}")]
    Command(#[from] TransportError),
    #[error("announcement failed: {0}")]
    Announcement(String),
    #[error("audio playback failed: {0}")]
    Audio(String),
}

/// Everything an action needs at execution time: the command station
/// handle, optional media backends, and the station context used for
/// announcement templates.
#[derive(Clone)]
pub struct ExecutionContext {
    pub station: Arc<CommandStationClient>,
    pub speech: Option<Arc<dyn SpeechBackend>>,
    pub sound: Option<Arc<dyn SoundBackend>>,
    pub current_station: Option<Station>,
    /// Journey announcement template; overrides the action's own text.
    pub template_text: Option<String>,
    /// 1-based position of the current station in its journey.
    pub station_number: Option<usize>,
}

impl ExecutionContext {
    pub fn new(station: Arc<CommandStationClient>) -> Self {
        Self {
            station,
            speech: None,
            sound: None,
            current_station: None,
            template_text: None,
            station_number: None,
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechBackend>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_sound(mut self, sound: Arc<dyn SoundBackend>) -> Self {
        self.sound = Some(sound);
        self
    }

    /// Derive a context scoped to one station stop.
    pub fn for_station(
        &self,
        station: &Station,
        station_number: usize,
        template_text: Option<&str>,
    ) -> Self {
        let mut context = self.clone();
        context.current_station = Some(station.clone());
        context.station_number = Some(station_number);
        context.template_text = template_text.map(str::to_string);
        context
    }
}

/// Execute one action's payload. Child actions are the engine's
/// concern, not handled here.
pub(crate) async fn execute(action: &Action, context: &ExecutionContext) -> Result<(), ActionError> {
    debug!(action = %action.name, kind = action.kind.as_str(), "action_executing");

    match &action.kind {
        ActionKind::Command { bytes } => {
            if bytes.is_empty() {
                debug!(action = %action.name, "command_skipped_no_bytes");
                return Ok(());
            }
            context.station.send_command(bytes).await?;
            debug!(action = %action.name, len = bytes.len(), "command_sent");
            Ok(())
        }
        ActionKind::Announcement { text } => {
            let template = context.template_text.as_deref().unwrap_or(text);
            let rendered = render_template(template, context);
            if rendered.is_empty() {
                debug!(action = %action.name, "announcement_skipped_no_text");
                return Ok(());
            }
            match &context.speech {
                Some(speech) => {
                    debug!(action = %action.name, text = %rendered, "announcement_spoken");
                    speech
                        .speak(&rendered)
                        .await
                        .map_err(|e| ActionError::Announcement(e.to_string()))
                }
                None => {
                    debug!(action = %action.name, "announcement_skipped_no_speech_backend");
                    Ok(())
                }
            }
        }
        ActionKind::Audio { file } => play(context, file, &action.name).await,
        ActionKind::Gong => play(context, GONG_SOUND, &action.name).await,
    }
}

async fn play(context: &ExecutionContext, file: &str, action_name: &str) -> Result<(), ActionError> {
    match &context.sound {
        Some(sound) => {
            debug!(action = %action_name, file = %file, "audio_played");
            sound.play(file).await.map_err(|e| ActionError::Audio(e.to_string()))
        }
        None => {
            debug!(action = %action_name, "audio_skipped_no_sound_backend");
            Ok(())
        }
    }
}

/// Substitute station placeholders in an announcement template.
///
/// Supported: `{StationName}`, `{ExitSide}` ("left"/"right"),
/// `{TrackNumber}`, `{StationNumber}` (1-based position).
fn render_template(template: &str, context: &ExecutionContext) -> String {
    let mut text = template.to_string();

    if let Some(station) = &context.current_station {
        text = text.replace("{StationName}", &station.name);
        text = text.replace("{ExitSide}", if station.exit_on_left { "left" } else { "right" });
        text = text.replace("{TrackNumber}", &station.track_number.to_string());
    }
    if let Some(number) = context.station_number {
        text = text.replace("{StationNumber}", &number.to_string());
    }

    text
}
