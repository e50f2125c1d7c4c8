use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ListingError;

/// Grant that matches every grant name in a [`StaticPolicy`].
pub const WILDCARD_GRANT: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(name: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".into(),
            roles: Vec::new(),
        }
    }
}

pub trait AuthorizationOracle: Send + Sync {
    fn can(&self, grant: &str, actor: &Actor) -> bool;
}

/// Role to grant table, usually loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicy {
    roles: HashMap<String, BTreeSet<String>>,
}

impl StaticPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant<I, S>(mut self, role: impl Into<String>, grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles
            .entry(role.into())
            .or_default()
            .extend(grants.into_iter().map(Into::into));
        self
    }

    pub fn grants_for(&self, role: &str) -> Option<&BTreeSet<String>> {
        self.roles.get(role)
    }
}

impl AuthorizationOracle for StaticPolicy {
    fn can(&self, grant: &str, actor: &Actor) -> bool {
        actor.roles.iter().any(|role| {
            self.roles
                .get(role)
                .is_some_and(|grants| grants.contains(grant) || grants.contains(WILDCARD_GRANT))
        })
    }
}

/// An oracle bound to the actor of the current request.
#[derive(Clone)]
pub struct Authorizer {
    oracle: Arc<dyn AuthorizationOracle>,
    actor: Actor,
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("actor", &self.actor)
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    pub fn new(oracle: Arc<dyn AuthorizationOracle>, actor: Actor) -> Self {
        Self { oracle, actor }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn allows(&self, grant: &str) -> bool {
        self.oracle.can(grant, &self.actor)
    }

    /// Fails closed with [`ListingError::Forbidden`] when the grant is absent.
    pub fn require(&self, grant: &str) -> Result<(), ListingError> {
        if self.allows(grant) {
            return Ok(());
        }
        warn!(actor = %self.actor.name, grant, "authorization denied");
        Err(ListingError::Forbidden {
            grant: grant.to_string(),
        })
    }
}
