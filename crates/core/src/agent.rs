#![forbid(unsafe_code)]

use crate::ids::{AgentId, IdentityId, OrganizationId};
use serde::{Deserialize, Serialize};

/// An agent that blocks can be attached to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub created_at_ms: i64,
}

/// An external identity (end user, tenant, ...) that blocks can be linked to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub organization_id: OrganizationId,
    pub identifier_key: String,
    pub name: String,
    pub created_at_ms: i64,
}
