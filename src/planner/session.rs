//! Interactive planner state
//!
//! [`PlannerSession`] drives one user's planner view: it holds the form,
//! the generated text and the in-progress flags. Every operation catches its
//! own failure, records exactly one user-visible message and resets the flag
//! it raised, so callers are never left in a loading, listening or speaking
//! state after an error.

use std::sync::Arc;

use super::generator::PlanGenerator;
use crate::budget::form::{InputTarget, PlanForm};
use crate::budget::{Plan, PlanId};
use crate::store::{Identity, PlanStore};
use crate::voice::{Playback, PlaybackHandle, PlaybackOutcome, Recognizer, SpeechBridge};
use crate::{Error, Result};

/// State of the planner for one user
pub struct PlannerSession {
    store: Arc<dyn PlanStore>,
    generator: Arc<dyn PlanGenerator>,
    playback: Option<Arc<dyn Playback>>,
    identity: Option<Identity>,
    bridge: SpeechBridge,
    form: PlanForm,
    plan_text: String,
    editing: Option<PlanId>,
    loading: bool,
    speaking: Option<PlaybackHandle>,
    error: Option<String>,
}

impl PlannerSession {
    #[must_use]
    pub fn new(
        store: Arc<dyn PlanStore>,
        generator: Arc<dyn PlanGenerator>,
        identity: Option<Identity>,
    ) -> Self {
        Self {
            store,
            generator,
            playback: None,
            identity,
            bridge: SpeechBridge::new(None),
            form: PlanForm::new(),
            plan_text: String::new(),
            editing: None,
            loading: false,
            speaking: None,
            error: None,
        }
    }

    /// Enable read-back through the given playback mode
    #[must_use]
    pub fn with_playback(mut self, playback: Arc<dyn Playback>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// Enable spoken input
    #[must_use]
    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.bridge = SpeechBridge::new(Some(recognizer));
        self
    }

    #[must_use]
    pub const fn form(&self) -> &PlanForm {
        &self.form
    }

    pub const fn form_mut(&mut self) -> &mut PlanForm {
        &mut self.form
    }

    #[must_use]
    pub fn plan_text(&self) -> &str {
        &self.plan_text
    }

    /// Plan being edited, if the session was opened from a saved record
    #[must_use]
    pub const fn editing(&self) -> Option<&PlanId> {
        self.editing.as_ref()
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.bridge.is_listening()
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// The message from the last failed action
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Whether speech input works here
    #[must_use]
    pub fn speech_available(&self) -> bool {
        self.bridge.is_available()
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::warn!(code = e.code(), error = %e, "planner action failed");
            self.error = Some(e.to_string());
        }
        result
    }

    /// Start a fresh plan
    pub fn reset(&mut self) {
        self.stop_playback();
        self.form = PlanForm::new();
        self.plan_text.clear();
        self.editing = None;
        self.error = None;
    }

    /// Load a saved plan for editing
    pub fn edit(&mut self, plan: &Plan) {
        self.stop_playback();
        self.form = PlanForm::from_plan(plan);
        self.plan_text.clone_from(&plan.plan_text);
        self.editing = Some(plan.id.clone());
        self.error = None;
    }

    /// Validate the form and generate plan text
    ///
    /// Validation failures are reported before any remote call.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` or `Error::Generation`; the message is
    /// also kept in [`Self::error`]
    pub async fn generate(&mut self) -> Result<&str> {
        self.error = None;
        let input = match self.form.validate() {
            Ok(input) => input,
            Err(e) => return self.record(Err(e)).map(|()| ""),
        };

        self.stop_playback();
        let generator = Arc::clone(&self.generator);
        let generated = {
            let _loading = LoadingFlag::raise(&mut self.loading);
            generator.generate(&input).await
        };

        match generated {
            Ok(text) => {
                tracing::info!(
                    provider = self.generator.name(),
                    words = text.split_whitespace().count(),
                    "plan generated"
                );
                self.plan_text = text;
                Ok(&self.plan_text)
            }
            Err(e) => self.record(Err(e)).map(|()| ""),
        }
    }

    /// Persist the current plan, creating it or replacing the edited record
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if there is no generated text, otherwise
    /// whatever the store reports
    pub fn save(&mut self) -> Result<Plan> {
        self.error = None;
        let result = self.persist();
        self.record(result)
    }

    fn persist(&mut self) -> Result<Plan> {
        if self.plan_text.trim().is_empty() {
            return Err(Error::Validation("generate a plan before saving".to_string()));
        }
        let draft = self.form.to_draft(&self.plan_text);
        let identity = self.identity.as_ref();

        let plan = match &self.editing {
            Some(id) => self.store.update(identity, id, draft)?,
            None => self.store.create(identity, draft)?,
        };

        tracing::info!(plan_id = %plan.id, "plan saved");
        self.editing = Some(plan.id.clone());
        Ok(plan)
    }

    /// Fill one field from speech
    ///
    /// # Errors
    ///
    /// Returns the recognition error; listening is always off afterwards
    pub async fn listen(&mut self, target: InputTarget) -> Result<Option<String>> {
        self.error = None;
        let result = self.bridge.listen(target, &mut self.form).await;
        self.record(result)
    }

    /// Start reading the plan aloud, or stop if already speaking
    ///
    /// Returns whether playback is now running.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` while generating or without plan text, and
    /// `Error::Config` when read-back is not set up
    pub fn toggle_playback(&mut self, voice: Option<String>) -> Result<bool> {
        if self.is_speaking() {
            self.stop_playback();
            return Ok(false);
        }
        self.error = None;
        let result = self.start_playback(voice);
        self.record(result).map(|()| true)
    }

    fn start_playback(&mut self, voice: Option<String>) -> Result<()> {
        if self.loading {
            return Err(Error::Validation("wait for the plan to finish generating".to_string()));
        }
        if self.plan_text.trim().is_empty() {
            return Err(Error::Validation("generate a plan before reading it aloud".to_string()));
        }
        let playback = self
            .playback
            .as_ref()
            .ok_or_else(|| Error::Config("read-back is not configured".to_string()))?;

        tracing::debug!(mode = playback.mode(), "starting read-back");
        self.speaking = Some(playback.start(self.plan_text.clone(), voice));
        Ok(())
    }

    /// Wait for the current read-back to end
    ///
    /// # Errors
    ///
    /// Returns the synthesis or audio error that ended playback
    pub async fn wait_playback(&mut self) -> Result<PlaybackOutcome> {
        let Some(handle) = self.speaking.take() else {
            return Ok(PlaybackOutcome::Stopped);
        };
        let result = handle.wait().await;
        self.record(result)
    }

    /// Stop read-back if it is running
    pub fn stop_playback(&mut self) {
        if let Some(handle) = self.speaking.take() {
            handle.stop();
        }
    }
}

/// Keeps `loading` set while a generation is in flight, even if the
/// future is dropped before it resolves
struct LoadingFlag<'a>(&'a mut bool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}
