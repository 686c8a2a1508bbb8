//! Block tree built from a single pass over the tag stream.

use crate::tag::TagEntry;

/// One block in the container, with its direct tag entries and sub-blocks.
#[derive(Debug, Clone, Default)]
pub struct BlockNode {
    /// Block kind; 0 for the synthetic root node.
    pub kind: i32,
    /// Tag entries directly inside this block, in file order.
    pub entries: Vec<TagEntry>,
    /// Nested blocks, in file order.
    pub children: Vec<BlockNode>,
}

impl BlockNode {
    pub(crate) fn new(kind: i32) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Find all blocks of the given kind, depth-first, including `self`.
    pub fn find_blocks(&self, kind: i32) -> Vec<&BlockNode> {
        let mut found = Vec::new();
        self.collect_blocks(kind, &mut found);
        found
    }

    fn collect_blocks<'a>(&'a self, kind: i32, found: &mut Vec<&'a BlockNode>) {
        if self.kind == kind {
            found.push(self);
        }
        for child in &self.children {
            child.collect_blocks(kind, found);
        }
    }

    /// First tag entry of the given kind directly inside this block.
    pub fn find_entry(&self, kind: i32) -> Option<&TagEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    /// All tag entries of the given kind directly inside this block.
    pub fn find_entries(&self, kind: i32) -> Vec<&TagEntry> {
        self.entries.iter().filter(|e| e.kind == kind).collect()
    }
}
