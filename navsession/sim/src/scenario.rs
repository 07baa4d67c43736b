//! Scenario Files and Runner
//!
//! A scenario is a TOML file listing host events in order:
//!
//! ```toml
//! pacing_ms = 20
//!
//! [initial]
//! permission = true
//! auto_drive = false
//!
//! [[deep_links]]
//! payload = "geo:52.52,13.40"
//! screen = "route-preview"
//!
//! [[steps]]
//! kind = "lifecycle"
//! phase = "created"
//!
//! [[steps]]
//! kind = "auto_drive"
//! enabled = true
//! ```
//!
//! The runner feeds each step to a session wired to recording collaborators
//! and writes one JSON object per line: the step, the session's reply, and
//! every collaborator call the step caused.

use std::path::{Path, PathBuf};
use std::time::Duration;

use navsession_core::recording::{HostCall, RecordingHost, StaticDeepLinks};
use navsession_core::{
    IntentAction, LifecyclePhase, MapStyle, NavigationIntent, OverlayId, PhaseTransition, Screen,
    Session, SessionConfig, SessionError, SessionHandle, SessionSnapshot,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Delay after signal steps when the scenario does not set one
pub const DEFAULT_PACING_MS: u64 = 10;

/// Errors loading or running a scenario
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Failed to read the scenario file
    #[error("Failed to read scenario at {path}: {source}")]
    Read {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse the scenario
    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to write output
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// Failed to encode an output line
    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    /// The session task stopped unexpectedly
    #[error("Session task failed: {0}")]
    Session(#[from] tokio::task::JoinError),
}

/// Collaborator state before the first step
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialState {
    /// Location permission granted
    pub permission: bool,
    /// Auto-drive flag value
    pub auto_drive: bool,
}

/// One deep-link table entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeepLink {
    /// Intent payload to match
    pub payload: String,
    /// Named screen it resolves to
    pub screen: String,
}

fn default_action() -> IntentAction {
    IntentAction::Navigate
}

/// A host event
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// Deliver a lifecycle phase
    Lifecycle {
        /// Phase to deliver
        phase: LifecyclePhase,
    },
    /// Grant or revoke location permission
    Permission {
        /// New permission state
        granted: bool,
    },
    /// Set the auto-drive flag
    AutoDrive {
        /// New flag value
        enabled: bool,
    },
    /// Publish a screen-state change
    ScreenState {
        /// Screen the screen manager reports from now on
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current: Option<String>,
    },
    /// Ask for the initial screen
    CreateScreen,
    /// Deliver an intent
    Intent {
        /// Intent action
        #[serde(default = "default_action")]
        action: IntentAction,
        /// Intent payload
        payload: String,
    },
    /// Change the map style
    MapStyle {
        /// Style id
        style: String,
    },
    /// Pause the scenario
    Wait {
        /// Milliseconds to wait
        ms: u64,
    },
    /// Print a session snapshot
    Snapshot,
}

impl Step {
    /// Whether the step publishes a stream item the session handles later
    #[must_use]
    pub fn is_signal(&self) -> bool {
        matches!(self, Self::AutoDrive { .. } | Self::ScreenState { .. })
    }
}

/// A parsed scenario file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Delay after each signal step, in milliseconds
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Collaborator state before the first step
    #[serde(default)]
    pub initial: InitialState,

    /// Deep-link table
    #[serde(default)]
    pub deep_links: Vec<DeepLink>,

    /// Steps in order
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_pacing_ms() -> u64 {
    DEFAULT_PACING_MS
}

impl Scenario {
    /// Parse a scenario from TOML text
    ///
    /// # Errors
    ///
    /// [`ScenarioError::Parse`] for malformed TOML or unknown step kinds.
    pub fn parse(text: &str) -> Result<Self, ScenarioError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a scenario file
    ///
    /// # Errors
    ///
    /// [`ScenarioError::Read`] or [`ScenarioError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        Self::parse(&read_scenario(path)?)
    }

    fn deep_link_table(&self) -> StaticDeepLinks {
        self.deep_links
            .iter()
            .fold(StaticDeepLinks::new(), |links, link| {
                links.with_link(link.payload.clone(), Screen::named(link.screen.clone()))
            })
    }
}

fn read_scenario(path: &Path) -> Result<String, ScenarioError> {
    std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// One line of runner output
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum OutputLine<'a> {
    Started {
        scenario: Option<&'a str>,
        overlays: Vec<&'a str>,
    },
    Step {
        index: usize,
        step: &'a Step,
    },
    Transition {
        index: usize,
        transition: PhaseTransition,
    },
    Screen {
        index: usize,
        screen: Screen,
    },
    Applied {
        index: usize,
    },
    Rejected {
        index: usize,
        error: String,
    },
    Call {
        call: HostCall,
    },
    Snapshot {
        snapshot: SessionSnapshot,
    },
    Finished {
        steps: usize,
        calls: usize,
        rejected: usize,
    },
}

/// Totals for a finished run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps executed
    pub steps: usize,
    /// Collaborator calls observed
    pub calls: usize,
    /// Steps the session rejected
    pub rejected: usize,
}

/// Drives a session through a scenario
pub struct ScenarioRunner<W> {
    host: RecordingHost,
    out: W,
    pacing: Duration,
    cursor: usize,
    summary: RunSummary,
}

impl<W: AsyncWrite + Unpin> ScenarioRunner<W> {
    /// Wire recording collaborators for `scenario`
    ///
    /// `pacing` overrides the scenario's own pacing when set.
    #[must_use]
    pub fn new(scenario: &Scenario, pacing: Option<Duration>, out: W) -> Self {
        let host = RecordingHost::with_deep_links(scenario.deep_link_table());
        host.permission.set(scenario.initial.permission);
        host.auto_drive.set(scenario.initial.auto_drive);

        Self {
            host,
            out,
            pacing: pacing.unwrap_or(Duration::from_millis(scenario.pacing_ms)),
            cursor: 0,
            summary: RunSummary::default(),
        }
    }

    /// Collaborators the session is wired to
    #[must_use]
    pub fn host(&self) -> &RecordingHost {
        &self.host
    }

    /// Run every step on a fresh session, shut it down and return the totals
    ///
    /// # Errors
    ///
    /// Output failures and a crashed session task. Steps the session rejects
    /// are reported in the output, not as errors.
    pub async fn run(
        &mut self,
        scenario: &Scenario,
        config: &SessionConfig,
    ) -> Result<RunSummary, ScenarioError> {
        let (handle, task) = Session::spawn(config, self.host.services());
        tracing::info!(session = %handle.id(), steps = scenario.steps.len(), "Scenario started");

        let overlays = config.overlays.iter().map(OverlayId::as_str).collect();
        self.emit(&OutputLine::Started {
            scenario: scenario.name.as_deref(),
            overlays,
        })
        .await?;

        for (index, step) in scenario.steps.iter().enumerate() {
            self.emit(&OutputLine::Step { index, step }).await?;
            self.execute(&handle, index, step).await?;
            if step.is_signal() {
                self.pace().await;
            }
            self.drain_calls().await?;
            self.summary.steps += 1;
        }

        drop(handle);
        task.await?;
        self.drain_calls().await?;

        let summary = self.summary;
        self.emit(&OutputLine::Finished {
            steps: summary.steps,
            calls: summary.calls,
            rejected: summary.rejected,
        })
        .await?;
        self.out.flush().await?;
        tracing::info!(?summary, "Scenario finished");
        Ok(summary)
    }

    async fn execute(
        &mut self,
        handle: &SessionHandle,
        index: usize,
        step: &Step,
    ) -> Result<(), ScenarioError> {
        match step {
            Step::Lifecycle { phase } => {
                let reply = handle.lifecycle(*phase).await;
                self.reply(index, reply, |transition| OutputLine::Transition {
                    index,
                    transition,
                })
                .await
            }
            Step::Permission { granted } => {
                self.host.permission.set(*granted);
                Ok(())
            }
            Step::AutoDrive { enabled } => {
                self.host.auto_drive.set(*enabled);
                Ok(())
            }
            Step::ScreenState { current } => {
                if let Some(name) = current {
                    self.host.screen_manager.set(Screen::named(name.clone()));
                }
                let receivers = self.host.screen_state.notify();
                tracing::debug!(receivers, "Screen state published");
                Ok(())
            }
            Step::CreateScreen => {
                let reply = handle.create_screen().await;
                self.reply(index, reply, |screen| OutputLine::Screen { index, screen })
                    .await
            }
            Step::Intent { action, payload } => {
                let intent = NavigationIntent {
                    action: *action,
                    payload: payload.clone(),
                };
                let reply = handle.new_intent(intent).await;
                self.reply(index, reply, |screen| OutputLine::Screen { index, screen })
                    .await
            }
            Step::MapStyle { style } => {
                let reply = handle.map_style_changed(MapStyle::new(style.clone())).await;
                self.reply(index, reply, |()| OutputLine::Applied { index })
                    .await
            }
            Step::Wait { ms } => {
                // Scenario wait step
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            Step::Snapshot => match handle.snapshot().await {
                Ok(snapshot) => self.emit(&OutputLine::Snapshot { snapshot }).await,
                Err(e) => self.reject(index, &e).await,
            },
        }
    }

    async fn reply<T>(
        &mut self,
        index: usize,
        reply: Result<T, SessionError>,
        line: impl FnOnce(T) -> OutputLine<'static>,
    ) -> Result<(), ScenarioError> {
        match reply {
            Ok(value) => self.emit(&line(value)).await,
            Err(e) => self.reject(index, &e).await,
        }
    }

    async fn reject(&mut self, index: usize, error: &SessionError) -> Result<(), ScenarioError> {
        tracing::warn!(index, error = %error, "Step rejected");
        self.summary.rejected += 1;
        self.emit(&OutputLine::Rejected {
            index,
            error: error.to_string(),
        })
        .await
    }

    /// Pacing between signal steps so the session loop sees each value
    async fn pace(&self) {
        if !self.pacing.is_zero() {
            // Scenario pacing delay
            tokio::time::sleep(self.pacing).await;
        }
    }

    async fn drain_calls(&mut self) -> Result<(), ScenarioError> {
        let calls = self.host.journal.since(self.cursor);
        self.cursor += calls.len();
        self.summary.calls += calls.len();
        for call in calls {
            self.emit(&OutputLine::Call { call }).await?;
        }
        Ok(())
    }

    async fn emit(&mut self, line: &OutputLine<'_>) -> Result<(), ScenarioError> {
        let mut json = serde_json::to_vec(line)?;
        json.push(b'\n');
        self.out.write_all(&json).await?;
        Ok(())
    }
}
