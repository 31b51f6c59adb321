// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn journey: the ordered progression of steps a spawn moves through.
//!
//! A journey is a linear sequence of named steps. The parent drives the
//! first two steps itself; the remaining steps belong to the subprocess and
//! are reported back through the response directory. Diagnostics render the
//! journey so an operator can see exactly how far a failed spawn got.

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;

/// How the child process is being brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JourneyType {
    /// Fork and exec the application (or its wrapper) directly.
    SpawnDirectly,
    /// Start a preloader process that will fork workers later.
    StartPreloader,
    /// Ask an already-running preloader to fork a worker.
    SpawnThroughPreloader,
}

/// A named step in the spawn journey. Order matters: the declaration order
/// here is the order steps appear in the journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JourneyStep {
    Preparation,
    HandshakePerform,
    SubprocessBeforeFirstExec,
    SubprocessWrapperPreparation,
    SubprocessAppLoadOrExec,
    SubprocessPrepareAfterForkingFromPreloader,
    SubprocessListen,
}

impl JourneyStep {
    /// Wire name, as used for `response/steps/<name>/` directories.
    pub fn as_str(&self) -> &'static str {
        match self {
            JourneyStep::Preparation => "preparation",
            JourneyStep::HandshakePerform => "handshake_perform",
            JourneyStep::SubprocessBeforeFirstExec => "subprocess_before_first_exec",
            JourneyStep::SubprocessWrapperPreparation => "subprocess_wrapper_preparation",
            JourneyStep::SubprocessAppLoadOrExec => "subprocess_app_load_or_exec",
            JourneyStep::SubprocessPrepareAfterForkingFromPreloader => {
                "subprocess_prepare_after_forking_from_preloader"
            }
            JourneyStep::SubprocessListen => "subprocess_listen",
        }
    }

    /// Steps owned by the subprocess, in journey order. The parent scans
    /// these when it reloads child-reported progress from disk.
    pub fn subprocess_steps() -> &'static [JourneyStep] {
        &[
            JourneyStep::SubprocessBeforeFirstExec,
            JourneyStep::SubprocessWrapperPreparation,
            JourneyStep::SubprocessAppLoadOrExec,
            JourneyStep::SubprocessPrepareAfterForkingFromPreloader,
            JourneyStep::SubprocessListen,
        ]
    }
}

impl fmt::Display for JourneyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single journey step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StepState {
    #[default]
    NotStarted,
    InProgress,
    Performed,
    Errored,
}

impl StepState {
    /// Parse the wire string a subprocess writes to `steps/<step>/state`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STEP_NOT_STARTED" => Some(StepState::NotStarted),
            "STEP_IN_PROGRESS" => Some(StepState::InProgress),
            "STEP_PERFORMED" => Some(StepState::Performed),
            "STEP_ERRORED" => Some(StepState::Errored),
            _ => None,
        }
    }
}

/// Per-step bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepInfo {
    pub state: StepState,
    pub duration: Option<Duration>,
}

/// An invalid step transition was requested without `force`.
#[derive(Debug, thiserror::Error)]
#[error("cannot transition step {step} from {from:?} to {to:?}")]
pub struct InvalidStepTransition {
    pub step: JourneyStep,
    pub from: StepState,
    pub to: StepState,
}

/// The ordered progression of steps for one spawn.
#[derive(Debug, Clone)]
pub struct Journey {
    journey_type: JourneyType,
    steps: IndexMap<JourneyStep, StepInfo>,
}

impl Journey {
    /// Build the journey for the given spawn method. `uses_wrapper` adds the
    /// wrapper-preparation step for apps started through a launcher script.
    pub fn new(journey_type: JourneyType, uses_wrapper: bool) -> Self {
        let mut steps = IndexMap::new();
        steps.insert(JourneyStep::Preparation, StepInfo::default());
        steps.insert(JourneyStep::HandshakePerform, StepInfo::default());
        match journey_type {
            JourneyType::SpawnDirectly | JourneyType::StartPreloader => {
                steps.insert(JourneyStep::SubprocessBeforeFirstExec, StepInfo::default());
                if uses_wrapper {
                    steps.insert(JourneyStep::SubprocessWrapperPreparation, StepInfo::default());
                }
                steps.insert(JourneyStep::SubprocessAppLoadOrExec, StepInfo::default());
                steps.insert(JourneyStep::SubprocessListen, StepInfo::default());
            }
            JourneyType::SpawnThroughPreloader => {
                steps.insert(
                    JourneyStep::SubprocessPrepareAfterForkingFromPreloader,
                    StepInfo::default(),
                );
                steps.insert(JourneyStep::SubprocessListen, StepInfo::default());
            }
        }
        Journey { journey_type, steps }
    }

    pub fn journey_type(&self) -> JourneyType {
        self.journey_type
    }

    pub fn has_step(&self, step: JourneyStep) -> bool {
        self.steps.contains_key(&step)
    }

    /// Look up a step's info. Steps not part of this journey read as
    /// not-started with no duration.
    pub fn step_info(&self, step: JourneyStep) -> StepInfo {
        self.steps.get(&step).copied().unwrap_or_default()
    }

    /// Steps of this journey in order, with their current info.
    pub fn steps(&self) -> impl Iterator<Item = (JourneyStep, StepInfo)> + '_ {
        self.steps.iter().map(|(step, info)| (*step, *info))
    }

    /// The earliest step that errored, if any.
    pub fn first_failed_step(&self) -> Option<JourneyStep> {
        self.steps
            .iter()
            .find(|(_, info)| info.state == StepState::Errored)
            .map(|(step, _)| *step)
    }

    pub fn set_step_in_progress(
        &mut self,
        step: JourneyStep,
        force: bool,
    ) -> Result<(), InvalidStepTransition> {
        self.transition(step, StepState::InProgress, force)
    }

    pub fn set_step_performed(
        &mut self,
        step: JourneyStep,
        force: bool,
    ) -> Result<(), InvalidStepTransition> {
        self.transition(step, StepState::Performed, force)
    }

    /// Mark a step errored. With `force` this always succeeds, which is how
    /// state is repaired after an abnormal subprocess exit.
    pub fn set_step_errored(
        &mut self,
        step: JourneyStep,
        force: bool,
    ) -> Result<(), InvalidStepTransition> {
        self.transition(step, StepState::Errored, force)
    }

    /// Record how long a step took. The subprocess reports durations in whole
    /// seconds; callers convert before handing them to us.
    pub fn set_step_execution_duration(&mut self, step: JourneyStep, duration: Duration) {
        if let Some(info) = self.steps.get_mut(&step) {
            info.duration = Some(duration);
        }
    }

    fn transition(
        &mut self,
        step: JourneyStep,
        to: StepState,
        force: bool,
    ) -> Result<(), InvalidStepTransition> {
        let Some(info) = self.steps.get_mut(&step) else {
            return Err(InvalidStepTransition { step, from: StepState::NotStarted, to });
        };
        let valid = match to {
            StepState::NotStarted => false,
            StepState::InProgress => info.state == StepState::NotStarted,
            StepState::Performed | StepState::Errored => info.state == StepState::InProgress,
        };
        if valid || force {
            info.state = to;
            Ok(())
        } else {
            Err(InvalidStepTransition { step, from: info.state, to })
        }
    }
}

#[cfg(test)]
#[path = "journey_tests.rs"]
mod tests;
