use super::conflict_resolution::Decision;
use crate::adapters::Entity;
use groupware_sync_lib::Prevalence;

/// Settles a first link, or a pair where both sides changed since the last pass
pub trait PrevalenceRule: Send + Sync {
    fn settle(&self, local: &Entity, remote: &Entity) -> Decision;
}

/// Local value always wins
pub struct LocalWinsRule;

impl PrevalenceRule for LocalWinsRule {
    fn settle(&self, _local: &Entity, _remote: &Entity) -> Decision {
        Decision::PushRemote
    }
}

/// Remote value always wins
pub struct RemoteWinsRule;

impl PrevalenceRule for RemoteWinsRule {
    fn settle(&self, _local: &Entity, _remote: &Entity) -> Decision {
        Decision::PullLocal
    }
}

/// Newer `modified_on` wins; equal timestamps go to the remote side
pub struct ChronologyRule;

impl PrevalenceRule for ChronologyRule {
    fn settle(&self, local: &Entity, remote: &Entity) -> Decision {
        if local.modified_on > remote.modified_on {
            Decision::PushRemote
        } else {
            Decision::PullLocal
        }
    }
}

/// Rule factory
pub struct PrevalenceRuleFactory;

impl PrevalenceRuleFactory {
    pub fn create_rule(prevalence: Prevalence) -> Box<dyn PrevalenceRule> {
        match prevalence {
            Prevalence::LocalWins => Box::new(LocalWinsRule),
            Prevalence::RemoteWins => Box::new(RemoteWinsRule),
            Prevalence::ChronologyWins => Box::new(ChronologyRule),
        }
    }
}
