use crate::workspace::BlockId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("unknown block type '{0}'")]
    UnknownBlockType(String),
    #[error("block {0} does not exist")]
    MissingBlock(BlockId),
    #[error("block type '{type_id}' has no input named '{slot}'")]
    UnknownSlot { type_id: String, slot: String },
    #[error("cannot connect {child} to '{slot}' of {parent}: {reason}")]
    ShapeMismatch {
        parent: BlockId,
        child: BlockId,
        slot: String,
        reason: &'static str,
    },
    #[error("connecting {child} under {parent} would create a cycle")]
    WouldCycle { parent: BlockId, child: BlockId },
    #[error("cyclic block reference at {0}")]
    Cycle(BlockId),
    #[error("block type '{0}' cannot be followed by another statement")]
    NoNextConnection(String),
    #[error("block type '{0}' has no argument editor")]
    NotToggleable(String),
    #[error("invalid workspace xml: {0}")]
    Xml(String),
}
