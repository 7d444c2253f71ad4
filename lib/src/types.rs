//! Shared types for the groupware sync engine and daemon

use serde::{Deserialize, Serialize};

/// Kind of personal-information entity carried by a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Contact,
    Event,
    Task,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Contact, EntityType::Event, EntityType::Task];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Contact => "contact",
            EntityType::Event => "event",
            EntityType::Task => "task",
        }
    }

}

impl std::str::FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "contact" => Ok(EntityType::Contact),
            "event" => Ok(EntityType::Event),
            "task" => Ok(EntityType::Task),
            _ => Err(anyhow::anyhow!("Unknown entity type {}", s)),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the two stores kept convergent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Local => Side::Remote,
            Side::Remote => Side::Local,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

/// Which side wins when both sides changed the same entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prevalence {
    LocalWins,
    RemoteWins,
    #[default]
    ChronologyWins,
}

/// What a single reconciliation step actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    RemoteCreated,
    RemoteUpdated,
    RemoteDeleted,
    LocalCreated,
    LocalUpdated,
    LocalDeleted,
    Unchanged,
}

/// Per-pass counters, one per side and action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub remote_created: u32,
    pub remote_updated: u32,
    pub remote_deleted: u32,
    pub local_created: u32,
    pub local_updated: u32,
    pub local_deleted: u32,
}

impl Statistics {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::RemoteCreated => self.remote_created += 1,
            Outcome::RemoteUpdated => self.remote_updated += 1,
            Outcome::RemoteDeleted => self.remote_deleted += 1,
            Outcome::LocalCreated => self.local_created += 1,
            Outcome::LocalUpdated => self.local_updated += 1,
            Outcome::LocalDeleted => self.local_deleted += 1,
            Outcome::Unchanged => {}
        }
    }

    pub fn merge(&mut self, other: &Statistics) {
        self.remote_created += other.remote_created;
        self.remote_updated += other.remote_updated;
        self.remote_deleted += other.remote_deleted;
        self.local_created += other.local_created;
        self.local_updated += other.local_updated;
        self.local_deleted += other.local_deleted;
    }

    /// Total number of writes performed on either side
    pub fn total(&self) -> u32 {
        self.remote_created
            + self.remote_updated
            + self.remote_deleted
            + self.local_created
            + self.local_updated
            + self.local_deleted
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl std::fmt::Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "remote +{} ~{} -{} | local +{} ~{} -{}",
            self.remote_created,
            self.remote_updated,
            self.remote_deleted,
            self.local_created,
            self.local_updated,
            self.local_deleted
        )
    }
}

/// Account-level health as seen by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountStatus {
    Connected,
    Disconnected(String),
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Connected => write!(f, "connected"),
            AccountStatus::Disconnected(reason) => write!(f, "disconnected: {}", reason),
        }
    }
}
