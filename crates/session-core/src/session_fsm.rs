//! Session resolution state machine.
//!
//! ```text
//! Resolving ──IdentitySignedIn──► FetchingProfile ──ProfileLoaded──► Active
//!     │                                 ├──ResetRequired──► AwaitingPasswordReset ──ResetCompleted──► Active
//!     │                                 └──ProfileMissing / FetchFailed──► SignedOut
//!     ├──IdentitySignedOut──► SignedOut
//!     └──TimedOut──► SignedOut
//! SignedOut ──ProvisioningStarted──► Provisioning ──IdentitySignedIn──► FetchingProfile
//!                                         └──ProvisioningAbandoned──► SignedOut
//! ```
//!
//! Any settled state returns to `FetchingProfile` when a (possibly different)
//! identity signs in, and to `SignedOut` when the identity signs out.

use rust_fsm::*;
use serde::Serialize;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Resolving)

    Resolving => {
        IdentitySignedIn => FetchingProfile,
        IdentitySignedOut => SignedOut,
        ProvisioningStarted => Provisioning,
        TimedOut => SignedOut
    },
    SignedOut => {
        IdentitySignedIn => FetchingProfile,
        IdentitySignedOut => SignedOut,
        ProvisioningStarted => Provisioning
    },
    Provisioning => {
        IdentitySignedIn => FetchingProfile,
        IdentitySignedOut => SignedOut,
        ProvisioningAbandoned => SignedOut
    },
    FetchingProfile => {
        ProfileLoaded => Active,
        ResetRequired => AwaitingPasswordReset,
        ProfileMissing => SignedOut,
        FetchFailed => SignedOut,
        IdentitySignedIn => FetchingProfile,
        IdentitySignedOut => SignedOut
    },
    Active => {
        IdentitySignedIn => FetchingProfile,
        IdentitySignedOut => SignedOut
    },
    AwaitingPasswordReset => {
        ResetCompleted => Active,
        IdentitySignedIn => FetchingProfile,
        IdentitySignedOut => SignedOut
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Resolution phase as exposed on the session snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPhase {
    #[default]
    Resolving,
    SignedOut,
    Provisioning,
    FetchingProfile,
    Active,
    AwaitingPasswordReset,
}

impl From<&SessionMachineState> for ResolutionPhase {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Resolving => ResolutionPhase::Resolving,
            SessionMachineState::SignedOut => ResolutionPhase::SignedOut,
            SessionMachineState::Provisioning => ResolutionPhase::Provisioning,
            SessionMachineState::FetchingProfile => ResolutionPhase::FetchingProfile,
            SessionMachineState::Active => ResolutionPhase::Active,
            SessionMachineState::AwaitingPasswordReset => ResolutionPhase::AwaitingPasswordReset,
        }
    }
}

impl ResolutionPhase {
    /// True once resolution has reached a state the UI can render.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ResolutionPhase::SignedOut
                | ResolutionPhase::Active
                | ResolutionPhase::AwaitingPasswordReset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(inputs: &[SessionMachineInput]) -> SessionMachine {
        let mut machine = SessionMachine::new();
        for input in inputs {
            machine.consume(input).unwrap();
        }
        machine
    }

    #[test]
    fn test_resolution_to_active() {
        let machine = run(&[
            SessionMachineInput::IdentitySignedIn,
            SessionMachineInput::ProfileLoaded,
        ]);
        assert_eq!(*machine.state(), SessionMachineState::Active);
    }

    #[test]
    fn test_reset_required_then_completed() {
        let machine = run(&[
            SessionMachineInput::IdentitySignedIn,
            SessionMachineInput::ResetRequired,
            SessionMachineInput::ResetCompleted,
        ]);
        assert_eq!(*machine.state(), SessionMachineState::Active);
    }

    #[test]
    fn test_sign_up_flow() {
        let machine = run(&[
            SessionMachineInput::IdentitySignedOut,
            SessionMachineInput::ProvisioningStarted,
            SessionMachineInput::IdentitySignedIn,
            SessionMachineInput::ProfileLoaded,
        ]);
        assert_eq!(*machine.state(), SessionMachineState::Active);

        let machine = run(&[
            SessionMachineInput::ProvisioningStarted,
            SessionMachineInput::ProvisioningAbandoned,
        ]);
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);
    }

    #[test]
    fn test_missing_profile_signs_out() {
        let machine = run(&[
            SessionMachineInput::IdentitySignedIn,
            SessionMachineInput::ProfileMissing,
        ]);
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut machine = SessionMachine::new();
        assert!(machine.consume(&SessionMachineInput::ProfileLoaded).is_err());

        let mut machine = run(&[
            SessionMachineInput::IdentitySignedIn,
            SessionMachineInput::ProfileLoaded,
        ]);
        assert!(machine.consume(&SessionMachineInput::TimedOut).is_err());
        assert!(machine
            .consume(&SessionMachineInput::ProvisioningStarted)
            .is_err());
    }

    #[test]
    fn test_phase_mapping() {
        let machine = SessionMachine::new();
        let phase = ResolutionPhase::from(machine.state());
        assert_eq!(phase, ResolutionPhase::Resolving);
        assert!(!phase.is_settled());
        assert!(ResolutionPhase::AwaitingPasswordReset.is_settled());
    }
}
