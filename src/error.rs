//! Error type shared by the bridge and its collaborators.

use crate::core::parser::ParseError;
use crate::dom::{NodeId, NodeType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The raw handle was never issued, or its node has since been destroyed.
    #[error("invalid node handle {0:#x}")]
    InvalidHandle(u32),

    #[error("expected {expected} node, found {found}")]
    WrongNodeType { expected: NodeType, found: NodeType },

    #[error("node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("{0} nodes cannot hold children")]
    CannotHaveChildren(NodeType),

    #[error("node arena is full ({0} live nodes)")]
    ArenaFull(usize),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The host rejected a script memory access.
    #[error("AMX error {0} while accessing script memory")]
    Amx(i32),

    #[error("XML plugin is not loaded")]
    NotLoaded,
}

impl Error {
    pub(crate) fn io(path: &str, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_string(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
