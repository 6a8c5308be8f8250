use crate::api::RegistrationError;
use crate::delivery::DeliveryReport;

/// Lifecycle of the O1 PNF registration feature
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeatureState {
    /// `start` has not been called
    Idle,
    /// The enable flag was off, nothing runs
    Disabled,
    Running,
    /// Every endpoint was acknowledged by the collector
    Completed,
    /// A configuration or addressing failure ended the run
    Aborted(String),
    Stopped,
}

impl FeatureState {
    pub fn from_outcome(outcome: &Result<DeliveryReport, RegistrationError>) -> FeatureState {
        match outcome {
            Ok(_) => FeatureState::Completed,
            Err(RegistrationError::Stopped) => FeatureState::Stopped,
            Err(e) => FeatureState::Aborted(e.to_string()),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            FeatureState::Completed | FeatureState::Aborted(_) | FeatureState::Stopped
        )
    }

    pub fn status_code(&self) -> i32 {
        match self {
            FeatureState::Completed => 1,
            _ => 0,
        }
    }
}
