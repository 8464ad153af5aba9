// SPDX-License-Identifier: GPL-3.0
// block_cache.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::code_buffer::CodeAddr;
use crate::memory_map::{self, MemoryRegion, BIOS_SIZE, RAM_MASK, RAM_SIZE};
use log::debug;

/// Size of a code page in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// Number of RAM pages (mirrors folded).
pub const RAM_PAGES: usize = RAM_SIZE / PAGE_SIZE as usize;

/// Number of BIOS pages.
pub const BIOS_PAGES: usize = BIOS_SIZE / PAGE_SIZE as usize;

/// Second-level slots per page, one per instruction.
const SLOTS_PER_PAGE: usize = PAGE_SIZE as usize / 4;

/// Sets in the jump hash table.
const JUMP_SETS: usize = 4096;

/// Most deferred links that can wait for their target at once.
const MAX_PATCH_SITES: usize = 8192;

/// The generation a RAM page had when a block was compiled from it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PageStamp {
    pub page: u16,
    pub generation: u32,
}

/// A translated block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockEntry {
    pub pc: u32,

    /// Where the dispatcher and register jumps enter (the prologue).
    pub entry: CodeAddr,

    /// Where direct links enter, just past the prologue.
    pub body: CodeAddr,

    pub instruction_count: u32,
    pub cycles: u32,
    pub is_idle: bool,

    /// Start page and, for blocks crossing a page boundary, end page.
    pub stamps: [Option<PageStamp>; 2],
}

/// Index of a block in the arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockId(u32);

/// Result of looking a PC up without filtering stale blocks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Probe {
    Hit(BlockEntry),

    /// A block exists but its code page was written since it was compiled.
    Stale,

    Miss,
}

/// Which first-level table an address belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PageKind {
    Ram,
    Bios,
}

type SlotPage = Box<[Option<BlockId>]>;

/// Two-level page table from guest PC to translated block. RAM and BIOS
/// have separate first levels; second-level pages are allocated on first use.
pub struct BlockCache {
    blocks: Vec<BlockEntry>,
    ram_pages: Vec<Option<SlotPage>>,
    bios_pages: Vec<Option<SlotPage>>,

    // Per RAM page: bumped by writes while the page holds code.
    ram_generations: Vec<u32>,
    ram_has_code: Vec<bool>,
}

impl BlockCache {

    pub fn new() -> Self {
        BlockCache {
            blocks: Vec::new(),
            ram_pages: (0..RAM_PAGES).map(|_| None).collect(),
            bios_pages: (0..BIOS_PAGES).map(|_| None).collect(),
            ram_generations: vec![0; RAM_PAGES],
            ram_has_code: vec![false; RAM_PAGES],
        }
    }

    /// Number of blocks in the arena.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// True for PCs the cache can hold: word aligned, in RAM or BIOS.
    pub fn is_indexable(&self, pc: u32) -> bool {
        pc & 3 == 0 && locate(pc).is_some()
    }

    /// Returns the valid block compiled for exactly this PC.
    pub fn lookup(&self, pc: u32) -> Option<&BlockEntry> {
        let id = self.slot(pc)?;
        let block = &self.blocks[id.0 as usize];
        (block.pc == pc && self.stamps_valid(&block.stamps)).then_some(block)
    }

    /// Like `lookup`, but tells a stale block apart from no block at all.
    pub fn probe(&self, pc: u32) -> Probe {
        let Some(id) = self.slot(pc) else {
            return Probe::Miss;
        };
        let block = self.blocks[id.0 as usize];
        if block.pc != pc {
            Probe::Miss
        } else if self.stamps_valid(&block.stamps) {
            Probe::Hit(block)
        } else {
            Probe::Stale
        }
    }

    /// Indexes a block under its PC, reusing the arena entry of whatever block
    /// held the slot before. Returns `None` for PCs the cache cannot hold.
    pub fn insert(&mut self, pc: u32, block: BlockEntry) -> Option<BlockId> {

        let (kind, page, slot) = locate(pc)?;
        if pc & 3 != 0 {
            return None;
        }

        let table = match kind {
            PageKind::Ram => &mut self.ram_pages,
            PageKind::Bios => &mut self.bios_pages,
        };
        let slots = table[page].get_or_insert_with(|| vec![None; SLOTS_PER_PAGE].into_boxed_slice());

        let id = match slots[slot] {
            Some(id) => {
                self.blocks[id.0 as usize] = block;
                id
            },
            None => {
                let id = BlockId(self.blocks.len() as u32);
                self.blocks.push(block);
                slots[slot] = Some(id);
                id
            },
        };

        for stamp in block.stamps.iter().flatten() {
            self.ram_has_code[stamp.page as usize] = true;
        }

        Some(id)
    }

    /// Records a write to RAM at `offset`. Pages holding code move to a new
    /// generation, which makes every block compiled from them stale.
    #[inline(always)]
    pub fn note_ram_write(&mut self, offset: u32) {
        let page = ram_page(offset);
        if self.ram_has_code[page] {
            self.bump_generation(page);
        }
    }

    /// Makes every block compiled from the page holding `address` stale.
    pub fn invalidate_page(&mut self, address: u32) {
        if let MemoryRegion::Ram(offset) = memory_map::classify(address) {
            self.bump_generation(ram_page(offset));
        }
    }

    /// Current generation of a RAM page.
    #[inline(always)]
    pub fn page_generation(&self, page: u16) -> u32 {
        self.ram_generations[page as usize % RAM_PAGES]
    }

    /// Stamps for a block spanning `first_pc..=last_pc`. Blocks outside RAM
    /// cannot be overwritten and carry none.
    pub fn page_stamps(&self, first_pc: u32, last_pc: u32) -> [Option<PageStamp>; 2] {

        let stamp = |pc: u32| match memory_map::classify(pc) {
            MemoryRegion::Ram(offset) => {
                let page = ram_page(offset);
                Some(PageStamp { page: page as u16, generation: self.ram_generations[page] })
            },
            _ => None,
        };

        let first = stamp(first_pc);
        let last = stamp(last_pc);
        if last.map(|stamp| stamp.page) == first.map(|stamp| stamp.page) {
            [first, None]
        } else {
            [first, last]
        }
    }

    /// Drops every block. Page generations survive, since they describe RAM.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.ram_pages.iter_mut().for_each(|page| *page = None);
        self.bios_pages.iter_mut().for_each(|page| *page = None);
        self.ram_has_code.iter_mut().for_each(|flag| *flag = false);
    }

    fn slot(&self, pc: u32) -> Option<BlockId> {
        let (kind, page, slot) = locate(pc)?;
        let table = match kind {
            PageKind::Ram => &self.ram_pages,
            PageKind::Bios => &self.bios_pages,
        };
        table[page].as_ref()?[slot]
    }

    fn stamps_valid(&self, stamps: &[Option<PageStamp>; 2]) -> bool {
        stamps.iter().flatten().all(|stamp| self.page_generation(stamp.page) == stamp.generation)
    }

    fn bump_generation(&mut self, page: usize) {
        self.ram_generations[page] = self.ram_generations[page].wrapping_add(1);
        self.ram_has_code[page] = false;
        debug!("RAM page {:#05x} invalidated, generation {}", page, self.ram_generations[page]);
    }
}

#[inline(always)]
fn ram_page(offset: u32) -> usize {
    ((offset & RAM_MASK) / PAGE_SIZE) as usize
}

/// Finds the first-level table, page and slot for a PC.
fn locate(pc: u32) -> Option<(PageKind, usize, usize)> {
    let (kind, offset) = match memory_map::classify(pc) {
        MemoryRegion::Ram(offset) => (PageKind::Ram, offset),
        MemoryRegion::Bios(offset) => (PageKind::Bios, offset),
        _ => return None,
    };
    Some((kind, (offset / PAGE_SIZE) as usize, ((offset % PAGE_SIZE) >> 2) as usize))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct JumpEntry {
    pc: u32,
    code: CodeAddr,
}

/// Two-way set-associative map from register jump targets to block entries.
/// A hit in the second way swaps it to the front.
pub struct JumpHashTable {
    sets: Vec<[Option<JumpEntry>; 2]>,
}

impl JumpHashTable {

    pub fn new() -> Self {
        JumpHashTable {
            sets: vec![[None; 2]; JUMP_SETS],
        }
    }

    #[inline(always)]
    fn hash(pc: u32) -> usize {
        (((pc >> 12) ^ (pc >> 2)) as usize) & (JUMP_SETS - 1)
    }

    pub fn lookup(&mut self, pc: u32) -> Option<CodeAddr> {
        let set = &mut self.sets[Self::hash(pc)];
        if let Some(first) = set[0].filter(|entry| entry.pc == pc) {
            return Some(first.code);
        }
        let second = set[1].filter(|entry| entry.pc == pc)?;
        set.swap(0, 1);
        Some(second.code)
    }

    /// Adds or refreshes a mapping, making it the most recently used.
    pub fn insert(&mut self, pc: u32, code: CodeAddr) {
        let set = &mut self.sets[Self::hash(pc)];
        if !set[0].is_some_and(|entry| entry.pc == pc) {
            set[1] = set[0];
        }
        set[0] = Some(JumpEntry { pc, code });
    }

    pub fn clear(&mut self) {
        self.sets.iter_mut().for_each(|set| *set = [None; 2]);
    }
}

/// Exits waiting for their target block to be compiled.
pub struct PatchSiteList {
    sites: Vec<(CodeAddr, u32)>,
}

impl PatchSiteList {

    pub fn new() -> Self {
        PatchSiteList { sites: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Records an exit to patch once `target_pc` compiles. Returns false when
    /// the list is full; the exit then keeps going through the dispatcher.
    pub fn push(&mut self, site: CodeAddr, target_pc: u32) -> bool {
        if self.sites.len() >= MAX_PATCH_SITES {
            return false;
        }
        self.sites.push((site, target_pc));
        true
    }

    /// Removes and returns every site waiting for `target_pc`.
    pub fn take_for(&mut self, target_pc: u32) -> Vec<CodeAddr> {
        let mut taken = Vec::new();
        self.sites.retain(|&(site, target)| {
            if target == target_pc {
                taken.push(site);
                false
            } else {
                true
            }
        });
        taken
    }

    pub fn clear(&mut self) {
        self.sites.clear();
    }
}

#[cfg(test)]
mod tests;
