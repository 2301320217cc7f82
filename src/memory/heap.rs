//! Versioned heap with per-cell reference counts
//!
//! The heap is a linear chain of [`Generation`]s. Each generation holds only
//! the cells allocated or written while it was current; everything else is
//! resolved through older generations. Once a newer generation is opened the
//! older one is sealed: writes always land in the current generation, copying
//! a cell there the first time it is modified ("to-write" dereference).
//!
//! Reference counts live inside the versioned cell, so rolling back to an
//! older generation restores the counts along with the values, and discarding
//! generations frees everything allocated in them in bulk.
//!
//! # Faults
//!
//! All methods report engine invariant violations as [`EngineFault`]; none of
//! them are recoverable by the running program.

use super::iterator::IteratorState;
use super::value::{Address, HeapValue, Value};
use crate::interpreter::constants::HEAP_ADDRESS_START;
use crate::interpreter::errors::EngineFault;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use tracing::{debug, trace};

/// Identity of a generation; never reused within one heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationId(pub u64);

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// State of a heap cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellState {
    Live(HeapValue),
    Tombstone, // Freed; reads fault until a rollback revives an older version
}

/// One version of a heap cell
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub state: CellState,
    pub refs: u32,
    /// Generation the cell was allocated in
    pub origin: GenerationId,
}

impl Cell {
    pub fn is_live(&self) -> bool {
        matches!(self.state, CellState::Live(_))
    }
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub id: GenerationId,
    pub previous: Option<GenerationId>,
    cells: FxHashMap<Address, Cell>,
    /// `next_address` when the generation was opened
    first_address: u64,
}

/// Summary of one generation for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInfo {
    pub id: GenerationId,
    pub previous: Option<GenerationId>,
    pub cells: usize,
}

/// The heap
#[derive(Debug, Clone)]
pub struct Heap {
    generations: Vec<Generation>,
    /// Index of the newest generation holding each address
    latest: FxHashMap<Address, usize>,
    next_address: u64,
    next_generation: u64,
    allocations_since_collect: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            generations: vec![Generation {
                id: GenerationId(0),
                previous: None,
                cells: FxHashMap::default(),
                first_address: HEAP_ADDRESS_START,
            }],
            latest: FxHashMap::default(),
            next_address: HEAP_ADDRESS_START,
            next_generation: 1,
            allocations_since_collect: 0,
        }
    }

    // The chain always holds at least the root generation
    fn current_index(&self) -> usize {
        self.generations.len() - 1
    }

    fn index_of(&self, generation: GenerationId) -> Option<usize> {
        self.generations
            .binary_search_by_key(&generation, |g| g.id)
            .ok()
    }

    pub fn current_generation(&self) -> GenerationId {
        self.generations[self.current_index()].id
    }

    pub fn generation_count(&self) -> usize {
        self.generations.len()
    }

    /// Oldest-first summary of the chain
    pub fn generation_chain(&self) -> Vec<GenerationInfo> {
        self.generations
            .iter()
            .map(|g| GenerationInfo {
                id: g.id,
                previous: g.previous,
                cells: g.cells.len(),
            })
            .collect()
    }

    pub fn allocations_since_collect(&self) -> usize {
        self.allocations_since_collect
    }

    /// Seal the current generation and open a new one on top of it
    pub fn new_generation(&mut self) -> GenerationId {
        let id = GenerationId(self.next_generation);
        self.next_generation += 1;
        let previous = self.current_generation();
        self.generations.push(Generation {
            id,
            previous: Some(previous),
            cells: FxHashMap::default(),
            first_address: self.next_address,
        });
        trace!(%id, %previous, "opened generation");
        id
    }

    /// Create a cell in the current generation. The caller owns the single
    /// initial reference.
    pub fn allocate(&mut self, value: HeapValue) -> Address {
        let address = Address(self.next_address);
        self.next_address += 1;
        let current = self.current_index();
        let origin = self.generations[current].id;
        self.generations[current].cells.insert(
            address,
            Cell {
                state: CellState::Live(value),
                refs: 1,
                origin,
            },
        );
        self.latest.insert(address, current);
        self.allocations_since_collect += 1;
        address
    }

    fn locate(&self, address: Address) -> Result<&Cell, EngineFault> {
        let index = *self
            .latest
            .get(&address)
            .ok_or(EngineFault::HeapSegmentationFault { address })?;
        let generation = &self.generations[index];
        generation
            .cells
            .get(&address)
            .ok_or_else(|| EngineFault::HeapBigNodeLinkFault {
                generation: generation.id,
                detail: format!("index points at a generation without cell {}", address),
            })
    }

    /// Read-only dereference through the generation chain
    pub fn read(&self, address: Address) -> Result<&HeapValue, EngineFault> {
        match &self.locate(address)?.state {
            CellState::Live(value) => Ok(value),
            CellState::Tombstone => Err(EngineFault::FreedMemoryAccess { address }),
        }
    }

    /// Read a cell as it was visible from `generation`
    pub fn read_at(
        &self,
        generation: GenerationId,
        address: Address,
    ) -> Result<&HeapValue, EngineFault> {
        let mut index = self
            .index_of(generation)
            .ok_or_else(|| EngineFault::HeapBigNodeLinkFault {
                generation,
                detail: "generation is not part of the chain".to_string(),
            })?;

        loop {
            let current = &self.generations[index];
            if let Some(cell) = current.cells.get(&address) {
                return match &cell.state {
                    CellState::Live(value) => Ok(value),
                    CellState::Tombstone => Err(EngineFault::FreedMemoryAccess { address }),
                };
            }

            match current.previous {
                None => return Err(EngineFault::HeapSegmentationFault { address }),
                Some(previous) => {
                    if index == 0 || self.generations[index - 1].id != previous {
                        return Err(EngineFault::HeapBigNodeLinkFault {
                            generation: current.id,
                            detail: format!("previous link {} does not match the chain", previous),
                        });
                    }
                    index -= 1;
                }
            }
        }
    }

    pub fn cell(&self, address: Address) -> Result<&Cell, EngineFault> {
        self.locate(address)
    }

    pub fn is_freed(&self, address: Address) -> bool {
        matches!(
            self.locate(address).map(|c| &c.state),
            Ok(CellState::Tombstone)
        )
    }

    pub fn reference_count(&self, address: Address) -> Result<u32, EngineFault> {
        let cell = self.locate(address)?;
        if cell.is_live() {
            Ok(cell.refs)
        } else {
            Err(EngineFault::FreedMemoryAccess { address })
        }
    }

    /// Copy-on-write: bring the cell into the current generation (once) and
    /// return it for mutation
    fn live_cell_mut(&mut self, address: Address) -> Result<&mut Cell, EngineFault> {
        let current = self.current_index();
        let index = *self
            .latest
            .get(&address)
            .ok_or(EngineFault::HeapSegmentationFault { address })?;

        if index != current {
            let copy = self.generations[index]
                .cells
                .get(&address)
                .cloned()
                .ok_or(EngineFault::HeapSegmentationFault { address })?;
            if !copy.is_live() {
                return Err(EngineFault::FreedMemoryAccess { address });
            }
            self.generations[current].cells.insert(address, copy);
            self.latest.insert(address, current);
        }

        let cell = self.generations[current]
            .cells
            .get_mut(&address)
            .ok_or(EngineFault::HeapSegmentationFault { address })?;
        if !cell.is_live() {
            return Err(EngineFault::FreedMemoryAccess { address });
        }
        Ok(cell)
    }

    /// "To-write" dereference. Mutations are visible from the current
    /// generation onward only.
    pub fn write_for_mutation(&mut self, address: Address) -> Result<&mut HeapValue, EngineFault> {
        match &mut self.live_cell_mut(address)?.state {
            CellState::Live(value) => Ok(value),
            CellState::Tombstone => Err(EngineFault::FreedMemoryAccess { address }),
        }
    }

    /// Mutable access to an iterator cell, cloning it into the current
    /// generation first if it was last written in an older one
    pub fn clone_on_generation_shift(
        &mut self,
        address: Address,
    ) -> Result<&mut IteratorState, EngineFault> {
        let current = self.current_generation();
        let holder = self.locate(address)?;
        if let Some(index) = self.latest.get(&address) {
            let last_written = self.generations[*index].id;
            if last_written != current {
                debug!(%address, origin = %holder.origin, %last_written, %current, "cloning iterator into current generation");
            }
        }

        match self.write_for_mutation(address)? {
            HeapValue::Iterator(iter) => Ok(iter),
            other => Err(EngineFault::UnexpectedHeapValue {
                address,
                expected: "iterator",
                found: other.type_name(),
            }),
        }
    }

    pub fn increase_reference_count(&mut self, address: Address) -> Result<u32, EngineFault> {
        let cell = self.live_cell_mut(address)?;
        cell.refs += 1;
        Ok(cell.refs)
    }

    /// Drop one reference. Cells reaching zero are tombstoned and their own
    /// references released in turn (worklist, no recursion). Returns the
    /// number of cells freed.
    pub fn decrease_reference_count(&mut self, address: Address) -> Result<usize, EngineFault> {
        let mut freed = 0;
        let mut worklist = vec![address];

        while let Some(address) = worklist.pop() {
            let cell = self.live_cell_mut(address)?;
            if cell.refs == 0 {
                return Err(EngineFault::ReferenceCountUnderflow { address });
            }
            cell.refs -= 1;
            if cell.refs == 0 {
                if let CellState::Live(value) = std::mem::replace(&mut cell.state, CellState::Tombstone)
                {
                    trace!(%address, kind = value.type_name(), "freed cell");
                    worklist.extend(value.children());
                }
                freed += 1;
            }
        }

        Ok(freed)
    }

    pub fn retain(&mut self, value: &Value) -> Result<(), EngineFault> {
        if let Value::Ref(address) = value {
            self.increase_reference_count(*address)?;
        }
        Ok(())
    }

    pub fn release(&mut self, value: &Value) -> Result<usize, EngineFault> {
        match value {
            Value::Ref(address) => self.decrease_reference_count(*address),
            _ => Ok(0),
        }
    }

    /// Roll back: drop every generation newer than `generation`. Cells
    /// allocated in them disappear and their address range is reused.
    pub fn discard_newer_than(&mut self, generation: GenerationId) -> Result<usize, EngineFault> {
        let index = match self.index_of(generation) {
            Some(index) => index,
            None if generation < self.generations[0].id => {
                return Err(EngineFault::FirstBigNodeRollback { generation })
            }
            None => return Err(EngineFault::NonRecoverableNodeRollback { generation }),
        };

        let removed: Vec<Generation> = self.generations.drain(index + 1..).collect();
        if let Some(first) = removed.first() {
            self.next_address = first.first_address;
        }

        for address in removed.iter().flat_map(|g| g.cells.keys()) {
            let owner = (0..=index)
                .rev()
                .find(|&i| self.generations[i].cells.contains_key(address));
            match owner {
                Some(i) => self.latest.insert(*address, i),
                None => self.latest.remove(address),
            };
        }

        debug!(to = %generation, discarded = removed.len(), "rolled back heap");
        Ok(removed.len())
    }

    /// Drop the current generation, returning to its predecessor
    pub fn rollback(&mut self) -> Result<GenerationId, EngineFault> {
        let current = self.current_generation();
        let previous = self.generations[self.current_index()]
            .previous
            .ok_or(EngineFault::FirstBigNodeRollback {
                generation: current,
            })?;
        self.discard_newer_than(previous)?;
        Ok(previous)
    }

    /// Merge every generation newer than `generation` into a single one.
    /// Visible values are unchanged; only history bookkeeping shrinks.
    pub fn collapse_to(&mut self, generation: GenerationId) -> Result<(), EngineFault> {
        let index = self
            .index_of(generation)
            .ok_or(EngineFault::NonRecoverableNodeRollback { generation })?;
        if index + 2 > self.current_index() {
            return Ok(());
        }

        let mut newer = self.generations.split_off(index + 1);
        let merged_count = newer.len();
        let mut base = newer.remove(0);
        for generation in newer {
            base.cells.extend(generation.cells);
        }
        base.previous = Some(generation);

        let merged_index = index + 1;
        for address in base.cells.keys() {
            self.latest.insert(*address, merged_index);
        }
        self.generations.push(base);

        debug!(to = %generation, merged = merged_count, "collapsed generations");
        Ok(())
    }

    /// Every visible cell, tombstones included, in address order
    pub fn cells(&self) -> Vec<(Address, &Cell)> {
        let mut cells: Vec<(Address, &Cell)> = self.visible().collect();
        cells.sort_by_key(|(address, _)| *address);
        cells
    }

    /// Visible cells in no particular order
    fn visible(&self) -> impl Iterator<Item = (Address, &Cell)> + '_ {
        self.latest.iter().filter_map(|(address, index)| {
            self.generations[*index]
                .cells
                .get(address)
                .map(|cell| (*address, cell))
        })
    }

    pub fn live_count(&self, predicate: impl Fn(&HeapValue) -> bool) -> usize {
        self.visible()
            .filter(|(_, cell)| match &cell.state {
                CellState::Live(value) => predicate(value),
                CellState::Tombstone => false,
            })
            .count()
    }

    /// Secondary collector for reference cycles: tombstones (in the current
    /// generation) every live cell unreachable from `roots`, and drops the
    /// references those cells held on cells that stay alive.
    pub fn collect_cycles(&mut self, roots: &[Address]) -> Result<usize, EngineFault> {
        let mut marked = FxHashSet::default();
        let mut worklist = roots.to_vec();
        while let Some(address) = worklist.pop() {
            if marked.insert(address) {
                worklist.extend(self.read(address)?.children());
            }
        }

        let garbage: Vec<Address> = self
            .visible()
            .filter(|(address, cell)| cell.is_live() && !marked.contains(address))
            .map(|(address, _)| address)
            .collect();

        for address in &garbage {
            let children = self.read(*address)?.children();
            for child in children {
                if marked.contains(&child) {
                    let cell = self.live_cell_mut(child)?;
                    if cell.refs == 0 {
                        return Err(EngineFault::ReferenceCountUnderflow { address: child });
                    }
                    cell.refs -= 1;
                }
            }
        }

        for address in &garbage {
            let cell = self.live_cell_mut(*address)?;
            cell.state = CellState::Tombstone;
            cell.refs = 0;
        }

        self.allocations_since_collect = 0;
        debug!(roots = roots.len(), collected = garbage.len(), "cycle collection");
        Ok(garbage.len())
    }

    /// Check chain links and the address index
    pub fn verify_chain(&self) -> Result<(), EngineFault> {
        for (i, generation) in self.generations.iter().enumerate() {
            let expected = if i == 0 {
                None
            } else {
                Some(self.generations[i - 1].id)
            };
            if generation.previous != expected {
                return Err(EngineFault::HeapBigNodeLinkFault {
                    generation: generation.id,
                    detail: format!("previous is {:?}, expected {:?}", generation.previous, expected),
                });
            }
            if i > 0 && generation.id <= self.generations[i - 1].id {
                return Err(EngineFault::HeapBigNodeLinkFault {
                    generation: generation.id,
                    detail: "generation ids are not increasing".to_string(),
                });
            }
        }

        for (address, index) in &self.latest {
            let generation = self.generations.get(*index).ok_or_else(|| {
                EngineFault::HeapBigNodeLinkFault {
                    generation: self.current_generation(),
                    detail: format!("cell {} indexed past the end of the chain", address),
                }
            })?;
            if !generation.cells.contains_key(address) {
                return Err(EngineFault::HeapBigNodeLinkFault {
                    generation: generation.id,
                    detail: format!("cell {} missing from its indexed generation", address),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[i64]) -> HeapValue {
        HeapValue::List(items.iter().map(|n| Value::Int(*n)).collect())
    }

    #[test]
    fn test_generation_isolation() {
        let mut heap = Heap::new();
        let addr = heap.allocate(list(&[1]));
        let g1 = heap.current_generation();

        heap.new_generation();
        if let HeapValue::List(items) = heap.write_for_mutation(addr).unwrap() {
            items.push(Value::Int(2));
        }
        heap.new_generation();

        assert_eq!(heap.read_at(g1, addr).unwrap(), &list(&[1]));
        assert_eq!(heap.read(addr).unwrap(), &list(&[1, 2]));
    }

    #[test]
    fn test_copy_on_write_once_per_generation() {
        let mut heap = Heap::new();
        let addr = heap.allocate(list(&[]));
        heap.new_generation();

        for n in 0..3 {
            if let HeapValue::List(items) = heap.write_for_mutation(addr).unwrap() {
                items.push(Value::Int(n));
            }
        }

        let chain = heap.generation_chain();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].cells, 1);
        assert_eq!(heap.read(addr).unwrap(), &list(&[0, 1, 2]));
    }

    #[test]
    fn test_refcount_reaching_zero_frees() {
        let mut heap = Heap::new();
        let addr = heap.allocate(list(&[1]));
        heap.increase_reference_count(addr).unwrap();
        heap.decrease_reference_count(addr).unwrap();
        assert!(!heap.is_freed(addr));

        assert_eq!(heap.decrease_reference_count(addr).unwrap(), 1);
        assert!(heap.is_freed(addr));
        assert_eq!(
            heap.read(addr),
            Err(EngineFault::FreedMemoryAccess { address: addr })
        );
    }

    #[test]
    fn test_release_cascades_to_children() {
        let mut heap = Heap::new();
        let inner = heap.allocate(list(&[1]));
        let outer = heap.allocate(HeapValue::List(vec![Value::Ref(inner)]));

        assert_eq!(heap.decrease_reference_count(outer).unwrap(), 2);
        assert!(heap.is_freed(inner));
    }

    #[test]
    fn test_decrement_of_freed_cell_faults() {
        let mut heap = Heap::new();
        let addr = heap.allocate(list(&[]));
        heap.decrease_reference_count(addr).unwrap();
        assert_eq!(
            heap.decrease_reference_count(addr),
            Err(EngineFault::FreedMemoryAccess { address: addr })
        );
    }

    #[test]
    fn test_rollback_revives_freed_cell_and_refcount() {
        let mut heap = Heap::new();
        let addr = heap.allocate(list(&[7]));
        let frozen = heap.current_generation();
        heap.new_generation();

        heap.decrease_reference_count(addr).unwrap();
        assert!(heap.is_freed(addr));

        heap.discard_newer_than(frozen).unwrap();
        assert_eq!(heap.read(addr).unwrap(), &list(&[7]));
        assert_eq!(heap.reference_count(addr).unwrap(), 1);
    }

    #[test]
    fn test_discard_forgets_newer_allocations() {
        let mut heap = Heap::new();
        let frozen = heap.current_generation();
        heap.new_generation();
        let addr = heap.allocate(list(&[]));

        heap.discard_newer_than(frozen).unwrap();
        assert_eq!(
            heap.read(addr),
            Err(EngineFault::HeapSegmentationFault { address: addr })
        );
        // Address range is reused after the rollback
        assert_eq!(heap.allocate(list(&[])), addr);
    }

    #[test]
    fn test_collapse_keeps_visible_values() {
        let mut heap = Heap::new();
        let a = heap.allocate(list(&[1]));
        let base = heap.current_generation();
        for n in 2..5 {
            heap.new_generation();
            if let HeapValue::List(items) = heap.write_for_mutation(a).unwrap() {
                items.push(Value::Int(n));
            }
        }
        let b = heap.allocate(list(&[9]));
        let before_a = heap.read(a).unwrap().clone();

        heap.collapse_to(base).unwrap();
        assert_eq!(heap.generation_count(), 2);
        assert_eq!(heap.read(a).unwrap(), &before_a);
        assert_eq!(heap.read(b).unwrap(), &list(&[9]));
        assert_eq!(heap.read_at(base, a).unwrap(), &list(&[1]));
        heap.verify_chain().unwrap();
    }

    #[test]
    fn test_rollback_past_root_faults() {
        let mut heap = Heap::new();
        assert_eq!(
            heap.rollback(),
            Err(EngineFault::FirstBigNodeRollback {
                generation: GenerationId(0)
            })
        );
    }

    #[test]
    fn test_rollback_to_collapsed_generation_faults() {
        let mut heap = Heap::new();
        let root = heap.current_generation();
        let g1 = heap.new_generation();
        heap.new_generation();
        heap.collapse_to(root).unwrap();
        heap.new_generation();
        heap.new_generation();
        heap.collapse_to(g1).unwrap();

        let merged_away = GenerationId(g1.0 + 3);
        assert_eq!(
            heap.discard_newer_than(merged_away),
            Err(EngineFault::NonRecoverableNodeRollback {
                generation: merged_away
            })
        );
    }

    #[test]
    fn test_collect_cycles() {
        let mut heap = Heap::new();
        let keep = heap.allocate(list(&[]));
        let a = heap.allocate(HeapValue::List(vec![Value::Ref(keep)]));
        let b = heap.allocate(HeapValue::List(vec![Value::Ref(a)]));
        // a holds keep, b holds a
        heap.increase_reference_count(keep).unwrap();
        heap.increase_reference_count(a).unwrap();
        // a <-> b cycle
        if let HeapValue::List(items) = heap.write_for_mutation(a).unwrap() {
            items.push(Value::Ref(b));
        }
        heap.increase_reference_count(b).unwrap();
        // Drop the external handles: the cycle keeps both alive
        heap.decrease_reference_count(b).unwrap();
        heap.decrease_reference_count(a).unwrap();
        assert!(!heap.is_freed(a));

        assert_eq!(heap.collect_cycles(&[keep]).unwrap(), 2);
        assert!(heap.is_freed(a));
        assert!(heap.is_freed(b));
        assert_eq!(heap.reference_count(keep).unwrap(), 1);
    }
}
