use super::strategies::PrevalenceRuleFactory;
use crate::adapters::Entity;
use crate::persistency::types::EntityCorrelation;
use groupware_sync_lib::{Prevalence, Side};

/// What the harmonizer should do with a pair of candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Overwrite the remote entity with the local one
    PushRemote,
    /// Overwrite the local entity with the remote one
    PullLocal,
    /// Create the entity on the given side from the other side's value
    Create(Side),
    NoOp,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::PushRemote => "push_remote",
            Decision::PullLocal => "pull_local",
            Decision::Create(Side::Local) => "create_local",
            Decision::Create(Side::Remote) => "create_remote",
            Decision::NoOp => "no_op",
        }
    }

    fn favouring(side: Side) -> Self {
        match side {
            Side::Local => Decision::PushRemote,
            Side::Remote => Decision::PullLocal,
        }
    }
}

/// Decide how to reconcile a change seen on `origin`.
///
/// With a single candidate the missing side gets a copy. With both, the triggering side
/// wins outright when the other side still carries the signature recorded at the last
/// reconciliation; otherwise (first link, or both changed) the prevalence rule settles it.
pub fn resolve(
    origin: Side,
    local: Option<&Entity>,
    remote: Option<&Entity>,
    correlation: Option<&EntityCorrelation>,
    prevalence: Prevalence,
) -> Decision {
    match (local, remote) {
        (None, None) => Decision::NoOp,
        (Some(_), None) => Decision::Create(Side::Remote),
        (None, Some(_)) => Decision::Create(Side::Local),
        (Some(local), Some(remote)) => {
            let other = origin.opposite();
            let other_entity = match other {
                Side::Local => local,
                Side::Remote => remote,
            };
            match correlation {
                Some(c) if c.signature(other) == other_entity.signature() => {
                    Decision::favouring(origin)
                }
                _ => PrevalenceRuleFactory::create_rule(prevalence).settle(local, remote),
            }
        }
    }
}
