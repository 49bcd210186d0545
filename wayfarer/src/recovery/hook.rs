use super::error::RecoveryError;

/// A component that must re-arm itself after an emergency recovery.
///
/// Recovery tears down every coordinator registration. Hooks run after the
/// monitor's own checks are back, in registration order; the first failing
/// hook fails the recovery attempt.
pub trait RecoveryHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Re-register whatever timers or subscriptions the component needs.
    fn on_recovered(&self) -> Result<(), RecoveryError>;
}
