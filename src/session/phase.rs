use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::KioskError;
use crate::tracker::DiagnosisReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    TextView,
    Reading,
    Diagnosis,
    Report,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::TextView => "text view",
            SessionPhase::Reading => "reading",
            SessionPhase::Diagnosis => "diagnosis",
            SessionPhase::Report => "report",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhaseTrigger {
    StartSession,
    BeginReading,
    BeginDiagnosis,
    DiagnosisComplete(Option<DiagnosisReport>),
    Reset,
}

impl PhaseTrigger {
    /// The trigger the authority means when it announces `phase`.
    pub fn announcing(phase: SessionPhase) -> Self {
        match phase {
            SessionPhase::Idle => PhaseTrigger::Reset,
            SessionPhase::TextView => PhaseTrigger::StartSession,
            SessionPhase::Reading => PhaseTrigger::BeginReading,
            SessionPhase::Diagnosis => PhaseTrigger::BeginDiagnosis,
            SessionPhase::Report => PhaseTrigger::DiagnosisComplete(None),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PhaseTrigger::StartSession => "start the session",
            PhaseTrigger::BeginReading => "begin reading",
            PhaseTrigger::BeginDiagnosis => "begin diagnosis",
            PhaseTrigger::DiagnosisComplete(_) => "complete the diagnosis",
            PhaseTrigger::Reset => "reset",
        }
    }

    pub fn target(&self) -> SessionPhase {
        match self {
            PhaseTrigger::StartSession => SessionPhase::TextView,
            PhaseTrigger::BeginReading => SessionPhase::Reading,
            PhaseTrigger::BeginDiagnosis => SessionPhase::Diagnosis,
            PhaseTrigger::DiagnosisComplete(_) => SessionPhase::Report,
            PhaseTrigger::Reset => SessionPhase::Idle,
        }
    }

    fn source(&self) -> Option<SessionPhase> {
        match self {
            PhaseTrigger::StartSession => Some(SessionPhase::Idle),
            PhaseTrigger::BeginReading => Some(SessionPhase::TextView),
            PhaseTrigger::BeginDiagnosis => Some(SessionPhase::Reading),
            PhaseTrigger::DiagnosisComplete(_) => Some(SessionPhase::Diagnosis),
            PhaseTrigger::Reset => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enter(SessionPhase),
    /// The trigger names the phase already active.
    ReEnter(SessionPhase),
}

/// Decides what `trigger` does from `from`. Reset is accepted everywhere;
/// every other trigger has exactly one source phase, or re-enters when it
/// names the current phase.
pub fn resolve(from: SessionPhase, trigger: &PhaseTrigger) -> Result<Transition, KioskError> {
    let target = trigger.target();
    if target == from {
        return Ok(Transition::ReEnter(target));
    }
    match trigger.source() {
        None => Ok(Transition::Enter(target)),
        Some(source) if source == from => Ok(Transition::Enter(target)),
        Some(_) => Err(KioskError::InvalidTransition {
            from,
            trigger: trigger.name(),
        }),
    }
}

/// What the screen shows for a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseControls {
    pub show_text: bool,
    pub begin_reading: bool,
    pub begin_diagnosis: bool,
    pub show_tracking_panel: bool,
    pub show_report: bool,
}

impl PhaseControls {
    pub fn for_phase(phase: SessionPhase) -> Self {
        let none = Self {
            show_text: false,
            begin_reading: false,
            begin_diagnosis: false,
            show_tracking_panel: false,
            show_report: false,
        };
        match phase {
            SessionPhase::Idle => none,
            SessionPhase::TextView => Self {
                show_text: true,
                begin_reading: true,
                ..none
            },
            SessionPhase::Reading => Self {
                show_text: true,
                begin_diagnosis: true,
                show_tracking_panel: true,
                ..none
            },
            SessionPhase::Diagnosis => Self {
                show_tracking_panel: true,
                ..none
            },
            SessionPhase::Report => Self {
                show_report: true,
                ..none
            },
        }
    }
}
