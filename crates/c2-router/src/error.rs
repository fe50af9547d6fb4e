//! Relay errors

use swarmlink_mesh::MeshError;
use thiserror::Error;

/// Console relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Operator input could not be parsed
    #[error("Invalid command: {0}")]
    Parse(String),

    /// Selection resolved to no reachable unit
    #[error("No targets selected")]
    NoTargets,

    /// Unit not present in the roster
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    /// Unit is known but its address is not
    #[error("No address known for unit {0}")]
    NoAddress(String),

    /// Command expects a reply and must go through `query`
    #[error("{0} is a query, it cannot be relayed without waiting for the reply")]
    QueryNotRelayable(String),

    /// Transport or codec failure
    #[error(transparent)]
    Mesh(#[from] MeshError),
}
