//! Authentication state machine for the GoTrue client.
//!
//! ```text
//! SignedOut ──SignUpAttempt──► SigningUp ──SignUpSucceeded──► SignedIn
//!     │                            └──SignUpFailed──► SignedOut
//!     └──SignInAttempt──► SigningIn ──SignInSucceeded──► SignedIn
//!                              └──SignInFailed──► SignedOut
//! SignedIn ──SignOutRequested──► SigningOut ──SignOutComplete──► SignedOut
//! ```
//!
//! A signed-in client may start another sign-in or sign-up; the previous
//! session is discarded when the attempt starts.

use rust_fsm::*;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(SignedOut)

    SignedOut => {
        SignUpAttempt => SigningUp,
        SignInAttempt => SigningIn
    },
    SigningUp => {
        SignUpSucceeded => SignedIn,
        SignUpFailed => SignedOut
    },
    SigningIn => {
        SignInSucceeded => SignedIn,
        SignInFailed => SignedOut
    },
    SignedIn => {
        SignUpAttempt => SigningUp,
        SignInAttempt => SigningIn,
        SignOutRequested => SigningOut
    },
    SigningOut => {
        SignOutComplete => SignedOut
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_signed_out() {
        let machine = AuthMachine::new();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_sign_in_then_out() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SignInAttempt).unwrap();
        machine.consume(&AuthMachineInput::SignInSucceeded).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedIn);

        machine.consume(&AuthMachineInput::SignOutRequested).unwrap();
        machine.consume(&AuthMachineInput::SignOutComplete).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_failed_sign_up_returns_to_signed_out() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SignUpAttempt).unwrap();
        machine.consume(&AuthMachineInput::SignUpFailed).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut machine = AuthMachine::new();
        assert!(machine
            .consume(&AuthMachineInput::SignOutRequested)
            .is_err());
        assert!(machine.consume(&AuthMachineInput::SignInSucceeded).is_err());
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }
}
