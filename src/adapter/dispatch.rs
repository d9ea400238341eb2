//! Per-request dispatch state machine

use tracing::debug;

use crate::config::Mode;
use crate::request::{PollyRequest, RawRequest};
use crate::{PollyError, Result};

use super::{Action, Adapter};

/// A request that completed dispatch
#[derive(Debug)]
pub struct Handled {
    /// Action taken for the request
    pub action: Action,
    /// The request after its hook ran
    pub request: PollyRequest,
}

/// Dispatch state; every state but `Replay` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Passthrough,
    Intercept,
    Record,
    Replay,
    Unhandled,
}

/// Result of the replay procedure
enum Replayed {
    Done,
    Record,
}

/// Initial step for a request, first match wins
fn route(mode: Mode, request: &PollyRequest) -> Step {
    if mode.is_passthrough() || request.should_passthrough {
        Step::Passthrough
    } else if request.should_intercept {
        Step::Intercept
    } else {
        match mode {
            Mode::Record => Step::Record,
            Mode::Replay => Step::Replay,
            Mode::Passthrough | Mode::Stopped => Step::Unhandled,
        }
    }
}

impl Adapter {
    /// Entry point a transport calls for every intercepted request
    ///
    /// Registers and sets up the request, then invokes exactly one hook.
    ///
    /// # Errors
    ///
    /// Returns error if setup, persistence or a hook fails, if replay finds
    /// no entry and `record_if_missing` is disabled, or if no rule matches
    pub async fn handle_request(&self, raw: RawRequest) -> Result<Handled> {
        let mut request = self.session.register_request(raw);
        request.setup().await?;

        let mode = self.session.mode().await;
        let mut step = route(mode, &request);
        debug!("Dispatching {} {} ({:?} mode, {:?})", request.method, request.url, mode, step);

        let action = loop {
            step = match step {
                Step::Passthrough => break self.passthrough(&mut request).await?,
                Step::Intercept => break self.intercept(&mut request).await?,
                Step::Record => break self.record(&mut request).await?,
                Step::Replay => match self.replay(&mut request).await? {
                    Replayed::Done => break Action::Replay,
                    Replayed::Record => Step::Record,
                },
                Step::Unhandled => {
                    return Err(self.session.fail(PollyError::UnhandledRequest {
                        adapter: self.id()?,
                        method: request.method.clone(),
                        url: request.url.clone(),
                    }));
                }
            };
        };

        self.increment(action);
        Ok(Handled { action, request })
    }

    async fn passthrough(&self, request: &mut PollyRequest) -> Result<Action> {
        request.set_action(Action::Passthrough)?;
        self.hooks
            .on_passthrough(request)
            .await
            .map_err(|e| self.session.escalate(e))?;
        Ok(Action::Passthrough)
    }

    async fn intercept(&self, request: &mut PollyRequest) -> Result<Action> {
        request.set_action(Action::Intercept)?;
        let response = request.invoke_intercept().await?;
        request.response = Some(response.clone());
        self.hooks
            .on_intercept(request, &response)
            .await
            .map_err(|e| self.session.escalate(e))?;
        Ok(Action::Intercept)
    }

    async fn record(&self, request: &mut PollyRequest) -> Result<Action> {
        request.set_action(Action::Record)?;
        self.hooks
            .on_record(request)
            .await
            .map_err(|e| self.session.escalate(e))?;
        Ok(Action::Record)
    }

    async fn replay(&self, request: &mut PollyRequest) -> Result<Replayed> {
        let found = self.session.persister().find_recording_entry(request).await?;

        let Some(mut entry) = found else {
            if self.session.config().record_if_missing {
                debug!("No recording for {} {}, recording", request.method, request.url);
                return Ok(Replayed::Record);
            }

            return Err(self.session.fail(PollyError::MissingRecording {
                adapter: self.id()?,
                method: request.method.clone(),
                url: request.url.clone(),
            }));
        };

        request.trigger_before_replay(&mut entry).await?;

        if self.session.expiration().should_re_record(
            &entry,
            self.session.now(),
            self.session.connectivity(),
        ) {
            debug!("Recording for {} {} expired, re-recording", request.method, request.url);
            return Ok(Replayed::Record);
        }

        let delay = self
            .session
            .timing()
            .delay(entry.request.timestamp, entry.response.timestamp);
        if !delay.is_zero() {
            debug!("Delaying replay of {} {} by {:?}", request.method, request.url, delay);
            tokio::time::sleep(delay).await;
        }

        request.set_action(Action::Replay)?;
        self.hooks
            .on_replay(request, &entry)
            .await
            .map_err(|e| self.session.escalate(e))?;
        Ok(Replayed::Done)
    }
}
