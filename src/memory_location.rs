//! Symbolic heap locations for the alias (points-to) analysis.

use crate::access_path::Path;
use crate::intern::{Interned, Interner};
use crate::ir::{BlockId, Field};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootMemoryLocation {
    Parameter(u32),
    Field(Interned<MemoryLocation>, Interned<Field>),
    /// Keyed by the allocating instruction's block and index within it, so
    /// two `new-instance`s produce distinct locations.
    Instruction(BlockId, u32),
    This,
}

/// A `(root-location, path)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryLocation {
    root: RootMemoryLocation,
    path: Path,
}

impl MemoryLocation {
    pub fn new(root: RootMemoryLocation, path: Path) -> Self {
        MemoryLocation { root, path }
    }

    pub fn root_only(root: RootMemoryLocation) -> Self {
        MemoryLocation { root, path: Path::empty() }
    }

    pub fn root(&self) -> &RootMemoryLocation {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn with_appended(&self, element: crate::access_path::Element) -> MemoryLocation {
        MemoryLocation {
            root: self.root.clone(),
            path: self.path.with_appended(element),
        }
    }
}

#[derive(Default)]
pub struct MemoryLocationFactory {
    interner: Interner<MemoryLocation>,
}

impl MemoryLocationFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, location: MemoryLocation) -> Interned<MemoryLocation> {
        self.interner.intern(location)
    }

    pub fn parameter(&self, position: u32) -> Interned<MemoryLocation> {
        self.intern(MemoryLocation::root_only(RootMemoryLocation::Parameter(position)))
    }

    pub fn this_(&self) -> Interned<MemoryLocation> {
        self.intern(MemoryLocation::root_only(RootMemoryLocation::This))
    }

    pub fn instruction(&self, block: BlockId, index: u32) -> Interned<MemoryLocation> {
        self.intern(MemoryLocation::root_only(RootMemoryLocation::Instruction(block, index)))
    }

    pub fn field(&self, parent: Interned<MemoryLocation>, name: Interned<Field>) -> Interned<MemoryLocation> {
        self.intern(MemoryLocation::new(
            RootMemoryLocation::Field(parent, name),
            Path::empty(),
        ))
    }
}
