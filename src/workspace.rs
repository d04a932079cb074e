use crate::error::BlockError;
use crate::registry::BlockRegistry;
use crate::schema::SlotKind;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Input(String),
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgMode {
    #[default]
    Compact,
    Expanded,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub type_id: String,
    pub fields: BTreeMap<String, String>,
    pub inputs: BTreeMap<String, BlockId>,
    pub next: Option<BlockId>,
    pub parent: Option<(BlockId, Link)>,
    pub arg_mode: ArgMode,
    pub position: Option<(i64, i64)>,
}

impl Block {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn input(&self, slot: &str) -> Option<BlockId> {
        self.inputs.get(slot).copied()
    }
}

/// Arena of block instances. Inputs and `next` links form a forest; every block
/// without a parent is a top-level stack.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    blocks: Vec<Option<Block>>,
    top: Vec<BlockId>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().flatten()
    }

    pub fn add_block(&mut self, type_id: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Some(Block {
            id,
            type_id: type_id.into(),
            fields: BTreeMap::new(),
            inputs: BTreeMap::new(),
            next: None,
            parent: None,
            arg_mode: ArgMode::Compact,
            position: None,
        }));
        self.top.push(id);
        id
    }

    pub fn get(&self, id: BlockId) -> Result<&Block, BlockError> {
        self.blocks
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(BlockError::MissingBlock(id))
    }

    pub fn get_mut(&mut self, id: BlockId) -> Result<&mut Block, BlockError> {
        self.blocks
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(BlockError::MissingBlock(id))
    }

    pub fn set_field(
        &mut self,
        id: BlockId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), BlockError> {
        self.get_mut(id)?.fields.insert(name.into(), value.into());
        Ok(())
    }

    pub fn set_position(&mut self, id: BlockId, x: i64, y: i64) -> Result<(), BlockError> {
        self.get_mut(id)?.position = Some((x, y));
        Ok(())
    }

    /// Top-level stacks ordered by canvas position (y, then x); blocks that were
    /// never placed keep creation order after the placed ones.
    pub fn top_blocks(&self) -> Vec<BlockId> {
        let mut ordered = self.top.clone();
        ordered.sort_by_key(|id| {
            let position = self.get(*id).ok().and_then(|b| b.position);
            match position {
                Some((x, y)) => (y, x),
                None => (i64::MAX, i64::MAX),
            }
        });
        ordered
    }

    /// Plugs `child` into a value or statement slot of `parent`. A block already
    /// occupying a value slot is bumped to the top level; a chain already occupying
    /// a statement slot is re-attached after the inserted chain when possible.
    pub fn connect_input(
        &mut self,
        registry: &BlockRegistry,
        parent: BlockId,
        slot: &str,
        child: BlockId,
    ) -> Result<(), BlockError> {
        let parent_type = self.get(parent)?.type_id.clone();
        let child_type = self.get(child)?.type_id.clone();
        let parent_schema = &registry.lookup(&parent_type)?.schema;
        let child_schema = &registry.lookup(&child_type)?.schema;
        let kind = parent_schema
            .slot(slot)
            .map(|s| s.kind.clone())
            .ok_or_else(|| BlockError::UnknownSlot {
                type_id: parent_type.clone(),
                slot: slot.to_string(),
            })?;
        let mismatch = |reason| BlockError::ShapeMismatch {
            parent,
            child,
            slot: slot.to_string(),
            reason,
        };
        match kind {
            SlotKind::Value if !child_schema.shape.fits_value() => {
                return Err(mismatch("block has no output"));
            }
            SlotKind::Statement if !child_schema.shape.fits_statement() => {
                return Err(mismatch("block is not a statement"));
            }
            SlotKind::Literal(_) => return Err(mismatch("slot is a literal field")),
            _ => {}
        }
        self.ensure_acyclic(parent, child)?;
        self.detach(child)?;

        let displaced = self.get_mut(parent)?.inputs.remove(slot);
        if let Some(old) = displaced {
            self.get_mut(old)?.parent = None;
            self.top.push(old);
        }
        self.attach(parent, Link::Input(slot.to_string()), child)?;

        if let (Some(old), SlotKind::Statement) = (displaced, kind) {
            let tail = self.chain_tail(child)?;
            if self.accepts_next(registry, tail) {
                self.detach(old)?;
                self.attach(tail, Link::Next, old)?;
            }
        }
        Ok(())
    }

    pub fn connect_next(
        &mut self,
        registry: &BlockRegistry,
        prev: BlockId,
        child: BlockId,
    ) -> Result<(), BlockError> {
        let prev_type = self.get(prev)?.type_id.clone();
        let child_type = self.get(child)?.type_id.clone();
        if !self.accepts_next(registry, prev) {
            registry.lookup(&prev_type)?;
            return Err(BlockError::NoNextConnection(prev_type));
        }
        if !registry.lookup(&child_type)?.schema.shape.fits_statement() {
            return Err(BlockError::ShapeMismatch {
                parent: prev,
                child,
                slot: "next".to_string(),
                reason: "block is not a statement",
            });
        }
        self.ensure_acyclic(prev, child)?;
        self.detach(child)?;

        let displaced = self.get_mut(prev)?.next.take();
        if let Some(old) = displaced {
            self.get_mut(old)?.parent = None;
            self.top.push(old);
        }
        self.attach(prev, Link::Next, child)?;
        if let Some(old) = displaced {
            let tail = self.chain_tail(child)?;
            if self.accepts_next(registry, tail) {
                self.detach(old)?;
                self.attach(tail, Link::Next, old)?;
            }
        }
        Ok(())
    }

    pub fn disconnect(&mut self, id: BlockId) -> Result<(), BlockError> {
        self.detach(id)?;
        if !self.top.contains(&id) {
            self.top.push(id);
        }
        Ok(())
    }

    pub fn delete(&mut self, id: BlockId) -> Result<(), BlockError> {
        self.detach(id)?;
        self.top.retain(|t| *t != id);
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(block) = self.blocks.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            pending.extend(block.inputs.values().copied());
            pending.extend(block.next);
        }
        Ok(())
    }

    pub(crate) fn attach(
        &mut self,
        parent: BlockId,
        link: Link,
        child: BlockId,
    ) -> Result<(), BlockError> {
        self.get(child)?;
        match &link {
            Link::Input(slot) => {
                self.get_mut(parent)?.inputs.insert(slot.clone(), child);
            }
            Link::Next => self.get_mut(parent)?.next = Some(child),
        }
        self.get_mut(child)?.parent = Some((parent, link));
        self.top.retain(|t| *t != child);
        Ok(())
    }

    fn detach(&mut self, id: BlockId) -> Result<(), BlockError> {
        let Some((parent, link)) = self.get_mut(id)?.parent.take() else {
            return Ok(());
        };
        let parent_block = self.get_mut(parent)?;
        match link {
            Link::Input(slot) => {
                parent_block.inputs.remove(&slot);
            }
            Link::Next => parent_block.next = None,
        }
        self.top.push(id);
        Ok(())
    }

    fn ensure_acyclic(&self, parent: BlockId, child: BlockId) -> Result<(), BlockError> {
        let mut current = Some(parent);
        while let Some(id) = current {
            if id == child {
                return Err(BlockError::WouldCycle { parent, child });
            }
            current = self.get(id)?.parent.as_ref().map(|(p, _)| *p);
        }
        Ok(())
    }

    fn chain_tail(&self, head: BlockId) -> Result<BlockId, BlockError> {
        let mut tail = head;
        while let Some(next) = self.get(tail)?.next {
            tail = next;
        }
        Ok(tail)
    }

    fn accepts_next(&self, registry: &BlockRegistry, id: BlockId) -> bool {
        self.get(id)
            .ok()
            .and_then(|b| registry.lookup(&b.type_id).ok())
            .map(|d| d.schema.has_next && d.schema.shape.fits_statement())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_slot_rejects_statements() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let print = ws.add_block("python_print");
        let pass = ws.add_block("python_pass");
        let err = ws.connect_input(&registry, print, "VALUE", pass).unwrap_err();
        assert!(matches!(err, BlockError::ShapeMismatch { .. }));
    }

    #[test]
    fn reconnecting_moves_the_child() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let first = ws.add_block("python_print");
        let second = ws.add_block("python_print");
        let number = ws.add_block("python_number");
        ws.connect_input(&registry, first, "VALUE", number).unwrap();
        ws.connect_input(&registry, second, "VALUE", number).unwrap();
        assert_eq!(ws.get(first).unwrap().input("VALUE"), None);
        assert_eq!(ws.get(second).unwrap().input("VALUE"), Some(number));
        assert_eq!(ws.top_blocks(), vec![first, second]);
    }

    #[test]
    fn cycles_are_refused() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let outer = ws.add_block("python_while");
        let inner = ws.add_block("python_if");
        ws.connect_input(&registry, outer, "DO", inner).unwrap();
        let err = ws.connect_input(&registry, inner, "DO0", outer).unwrap_err();
        assert_eq!(err, BlockError::WouldCycle { parent: inner, child: outer });
    }

    #[test]
    fn insertion_keeps_the_rest_of_the_chain() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let a = ws.add_block("python_pass");
        let c = ws.add_block("python_pass");
        let b = ws.add_block("python_pass");
        ws.connect_next(&registry, a, c).unwrap();
        ws.connect_next(&registry, a, b).unwrap();
        assert_eq!(ws.get(a).unwrap().next, Some(b));
        assert_eq!(ws.get(b).unwrap().next, Some(c));
        assert_eq!(ws.top_blocks(), vec![a]);
    }

    #[test]
    fn terminal_statements_have_no_successor() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let brk = ws.add_block("python_break");
        let pass = ws.add_block("python_pass");
        let err = ws.connect_next(&registry, brk, pass).unwrap_err();
        assert_eq!(err, BlockError::NoNextConnection("python_break".to_string()));
    }

    #[test]
    fn delete_takes_descendants_and_successors() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let cond = ws.add_block("python_if");
        let body = ws.add_block("python_print");
        let value = ws.add_block("python_number");
        let after = ws.add_block("python_pass");
        ws.connect_input(&registry, cond, "DO0", body).unwrap();
        ws.connect_input(&registry, body, "VALUE", value).unwrap();
        ws.connect_next(&registry, cond, after).unwrap();
        ws.delete(cond).unwrap();
        assert!(ws.is_empty());
        assert!(ws.top_blocks().is_empty());
    }

    #[test]
    fn placed_blocks_sort_by_position() {
        let mut ws = Workspace::new();
        let low = ws.add_block("python_pass");
        let high = ws.add_block("python_pass");
        let loose = ws.add_block("python_pass");
        ws.set_position(low, 0, 200).unwrap();
        ws.set_position(high, 40, 10).unwrap();
        assert_eq!(ws.top_blocks(), vec![high, low, loose]);
    }
}
