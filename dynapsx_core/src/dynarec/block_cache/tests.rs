// SPDX-License-Identifier: GPL-3.0
// tests.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::*;

// Tests for the block index, the jump hash table and the patch list.

fn block_at(cache: &BlockCache, pc: u32, length: u32, entry: CodeAddr) -> BlockEntry {
    BlockEntry {
        pc,
        entry,
        body: entry + 6,
        instruction_count: length,
        cycles: length,
        is_idle: false,
        stamps: cache.page_stamps(pc, pc + 4 * (length - 1)),
    }
}

#[test]
fn lookup_should_find_inserted_blocks_by_exact_pc() {

    let mut cache = BlockCache::new();
    let block = block_at(&cache, 0x8001_0000, 4, 10);
    cache.insert(0x8001_0000, block);

    assert_eq!(cache.lookup(0x8001_0000), Some(&block));

    // Given the same physical slot through another segment, the PC check misses.
    assert_eq!(cache.lookup(0x0001_0000), None);
    assert_eq!(cache.lookup(0x8001_0004), None);
}

#[test]
fn insert_should_replace_the_block_in_place() {

    let mut cache = BlockCache::new();
    let first = block_at(&cache, 0xBFC0_0000, 2, 10);
    let second = block_at(&cache, 0xBFC0_0000, 3, 40);

    let first_id = cache.insert(0xBFC0_0000, first);
    let second_id = cache.insert(0xBFC0_0000, second);

    assert_eq!(first_id, second_id);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.lookup(0xBFC0_0000), Some(&second));
}

#[test]
fn writes_to_code_pages_should_make_blocks_stale() {

    let mut cache = BlockCache::new();
    let block = block_at(&cache, 0x8001_0000, 4, 10);
    cache.insert(0x8001_0000, block);

    // A write to another page leaves the block alone.
    cache.note_ram_write(0x2_0000);
    assert_eq!(cache.probe(0x8001_0000), Probe::Hit(block));

    cache.note_ram_write(0x1_0FFC);
    assert_eq!(cache.probe(0x8001_0000), Probe::Stale);
    assert_eq!(cache.lookup(0x8001_0000), None);
}

#[test]
fn writes_to_pages_without_code_should_not_bump_generations() {

    let mut cache = BlockCache::new();
    cache.note_ram_write(0x3_0000);

    assert_eq!(cache.page_generation(0x30), 0);

    cache.invalidate_page(0x8003_0000);
    assert_eq!(cache.page_generation(0x30), 1);
}

#[test]
fn blocks_crossing_pages_should_carry_both_stamps() {

    let mut cache = BlockCache::new();
    let block = block_at(&cache, 0x8001_0FF8, 4, 10);
    assert_eq!(block.stamps[0].map(|stamp| stamp.page), Some(0x10));
    assert_eq!(block.stamps[1].map(|stamp| stamp.page), Some(0x11));

    cache.insert(0x8001_0FF8, block);
    cache.note_ram_write(0x1_1000);

    assert_eq!(cache.probe(0x8001_0FF8), Probe::Stale);
}

#[test]
fn bios_blocks_should_carry_no_stamps() {

    let cache = BlockCache::new();
    assert_eq!(cache.page_stamps(0xBFC0_0000, 0xBFC0_0100), [None, None]);
}

#[test]
fn is_indexable_should_reject_misaligned_and_io_addresses() {

    let cache = BlockCache::new();

    assert!(cache.is_indexable(0x8000_0080));
    assert!(cache.is_indexable(0xBFC0_0180));
    assert!(!cache.is_indexable(0x8000_0082));
    assert!(!cache.is_indexable(0x1F80_1080));
}

#[test]
fn clear_should_drop_blocks_but_keep_generations() {

    let mut cache = BlockCache::new();
    let block = block_at(&cache, 0x8001_0000, 1, 10);
    cache.insert(0x8001_0000, block);
    cache.invalidate_page(0x8001_0000);
    cache.clear();

    assert!(cache.is_empty());
    assert_eq!(cache.probe(0x8001_0000), Probe::Miss);
    assert_eq!(cache.page_generation(0x10), 1);
}

#[test]
fn jump_table_should_promote_the_second_way_on_hit() {

    let mut table = JumpHashTable::new();

    // Both PCs hash to the same set.
    let first = 0x8000_1000;
    let second = first ^ (1 << 14) ^ (1 << 4);
    assert_eq!(JumpHashTable::hash(first), JumpHashTable::hash(second));

    table.insert(first, 100);
    table.insert(second, 200);
    assert_eq!(table.lookup(first), Some(100));
    assert_eq!(table.lookup(second), Some(200));

    // Given `second` is now most recent, a third PC evicts `first`.
    let third = first ^ (2 << 14) ^ (2 << 4);
    table.insert(third, 300);

    assert_eq!(table.lookup(first), None);
    assert_eq!(table.lookup(second), Some(200));
    assert_eq!(table.lookup(third), Some(300));
}

#[test]
fn jump_table_insert_should_refresh_existing_entries() {

    let mut table = JumpHashTable::new();
    table.insert(0x8000_2000, 1);
    table.insert(0x8000_2000, 2);

    assert_eq!(table.lookup(0x8000_2000), Some(2));

    table.clear();
    assert_eq!(table.lookup(0x8000_2000), None);
}

#[test]
fn patch_list_should_hand_out_sites_per_target() {

    let mut patches = PatchSiteList::new();
    patches.push(10, 0x8000_0000);
    patches.push(20, 0x8000_0100);
    patches.push(30, 0x8000_0000);

    assert_eq!(patches.take_for(0x8000_0000), vec![10, 30]);
    assert_eq!(patches.len(), 1);
    assert!(patches.take_for(0x8000_0000).is_empty());
}

#[test]
fn patch_list_should_refuse_sites_when_full() {

    let mut patches = PatchSiteList::new();
    for site in 0..MAX_PATCH_SITES as u32 {
        assert!(patches.push(site, 0x8000_0000));
    }

    // Given a full list, the refused exit is not recorded, so it keeps
    // leaving through the dispatcher once its target compiles.
    assert!(!patches.push(0x7FFF_0000, 0x8000_0100));
    assert_eq!(patches.len(), MAX_PATCH_SITES);
    assert!(patches.take_for(0x8000_0100).is_empty());
    assert_eq!(patches.take_for(0x8000_0000).len(), MAX_PATCH_SITES);
}
