//! The top-level error taxonomy the reconciler's outer loop sees. Every component-level `Error`
//! (`discovery`, `planner`, `rolling_update`, `authconfig`, `crd`) is folded into one of these
//! variants, which is what `error_policy` inspects to decide whether to requeue at the retry
//! backoff or fall through to the terminal `Err` state.

use snafu::Snafu;
use stackable_operator::logging::controller::ReconcilerError;
use strum::EnumDiscriminants;

use crate::crd::RollingUpdateStrategy;

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(strum::IntoStaticStr))]
pub enum Error {
    #[snafu(display("transient cloud error"))]
    TransientCloud { source: crate::aws::client::SdkError },

    #[snafu(display("failed to resolve a referenced security group, subnet, or image"))]
    Resolution { source: crate::discovery::Error },

    #[snafu(display("the declared upgrade strategy is malformed: {reason}"))]
    StrategyValidation { reason: String },

    #[snafu(display("multiple scaling groups are tagged for this instance group; operator action is required"))]
    AmbiguousOwnership { namespace: String, name: String },

    #[snafu(display("failed to cordon or drain a node"))]
    Drain { source: crate::rolling_update::Error },

    #[snafu(display("aws-auth config map optimistic-concurrency retries exceeded"))]
    AuthConfigConflict { source: crate::authconfig::Error },

    #[snafu(display("discovery failed"))]
    Discovery { source: crate::discovery::Error },

    #[snafu(display("planning failed"))]
    Plan { source: crate::planner::Error },

    #[snafu(display("{source}"))]
    Crd { source: crate::crd::Error },

    #[snafu(display("failed to add or remove the cloud-resources finalizer"))]
    FinalizerWrite { source: stackable_operator::kube::Error },

    #[snafu(display("instance group has no name"))]
    UnnamedObject,

    #[snafu(display("the cloud-resources finalizer name is invalid"))]
    InvalidFinalizer,

    #[snafu(display("failed to apply the instance group's status"))]
    ApplyStatus { source: stackable_operator::kube::Error },

    #[snafu(display("failed to check the external upgrade CR's status"))]
    CrdStrategy { source: crate::crd_strategy::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }
}

/// Retryable `ReconcileState` set: `{Deleting, Init, InitCreate, InitDelete, InitUpdate,
/// InitUpgrade, Modified, Modifying}` vs. terminal `{Deleted, Ready, Err}`. An error is
/// retryable here exactly when it's one of `TransientCloudError`, `ResolutionError`,
/// `DrainFailure`, or `AuthConfigConflict`; everything else routes the resource to `Err`.
impl Error {
    pub fn retryable(&self) -> bool {
        match self {
            Error::TransientCloud { .. } => true,
            Error::Resolution { .. } => true,
            Error::Discovery { source } => discovery_retryable(source),
            Error::Drain { .. } => true,
            Error::AuthConfigConflict { .. } => true,
            Error::StrategyValidation { .. } => false,
            Error::AmbiguousOwnership { .. } => false,
            Error::Plan { source } => planner_retryable(source),
            Error::Crd { .. } => false,
            Error::FinalizerWrite { .. } => true,
            Error::UnnamedObject | Error::InvalidFinalizer => false,
            Error::ApplyStatus { .. } => true,
            Error::CrdStrategy { .. } => true,
        }
    }
}

fn discovery_retryable(source: &crate::discovery::Error) -> bool {
    !matches!(
        source,
        crate::discovery::Error::AmbiguousOwnership { .. } | crate::discovery::Error::NoNamespace
    )
}

fn planner_retryable(source: &crate::planner::Error) -> bool {
    match source {
        crate::planner::Error::CloudWrite { source } => source.is_transient,
        crate::planner::Error::Resolution { .. } => true,
        crate::planner::Error::NoEksSpec | crate::planner::Error::NoNamespace => false,
        crate::planner::Error::PreferredRoleNotFound => false,
    }
}

/// A `RollingUpdate`-typed strategy is validated up front so malformed fields fail fast here
/// rather than at the first orchestrator tick that would otherwise panic on a zero timeout or
/// bad percentage. A `Crd`-typed strategy delegates the rollout itself to an external
/// controller (this controller only polls its status, see `crd_strategy::is_active`), so there
/// is no `RollingUpdateStrategy` to validate in that case.
pub fn validate_strategy(strategy: &RollingUpdateStrategy) -> Result<(), String> {
    if strategy.drain_timeout_seconds == 0 {
        return Err("drainTimeoutSeconds must be greater than zero".to_string());
    }
    if let crate::crd::MaxUnavailable::Percent(value) = &strategy.max_unavailable {
        let trimmed = value.strip_suffix('%').unwrap_or(value);
        match trimmed.parse::<u32>() {
            Ok(0) | Err(_) => {
                return Err(format!("maxUnavailable percentage {value:?} is not a valid 1-100 value"));
            }
            Ok(percent) if percent > 100 => {
                return Err(format!("maxUnavailable percentage {value:?} exceeds 100"));
            }
            Ok(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::MaxUnavailable;

    fn strategy(max_unavailable: MaxUnavailable, drain_timeout_seconds: u32) -> RollingUpdateStrategy {
        RollingUpdateStrategy {
            max_unavailable,
            drain_timeout_seconds,
            force: true,
            readiness_gates: Vec::new(),
        }
    }

    #[test]
    fn zero_drain_timeout_is_rejected() {
        let err = validate_strategy(&strategy(MaxUnavailable::Count(1), 0)).unwrap_err();
        assert!(err.contains("drainTimeoutSeconds"));
    }

    #[test]
    fn out_of_range_percent_is_rejected() {
        let err = validate_strategy(&strategy(MaxUnavailable::Percent("150%".to_string()), 60)).unwrap_err();
        assert!(err.contains("exceeds 100"));
    }

    #[test]
    fn valid_strategy_passes() {
        assert!(validate_strategy(&strategy(MaxUnavailable::Percent("25%".to_string()), 900)).is_ok());
    }

    #[test]
    fn ambiguous_ownership_is_not_retryable() {
        let err = Error::AmbiguousOwnership { namespace: "ns".to_string(), name: "ig".to_string() };
        assert!(!err.retryable());
    }
}
