// SPDX-License-Identifier: GPL-3.0
// linker.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::block_cache::{BlockCache, PatchSiteList};
use super::code_buffer::{CodeAddr, CodeBuffer};
use crate::bios_hle::BiosHle;
use crate::config::DynarecConfig;
use log::debug;

/// How a block exit reaches its successor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkDecision {

    /// The successor is compiled: jump straight into its body.
    Direct(CodeAddr),

    /// Exit through the dispatcher for now and patch the jump once the
    /// successor compiles.
    Deferred,

    /// Always exit through the dispatcher.
    Never,
}

/// Decides how the exit of the block at `block_pc` towards `target` links.
pub fn decide(
    config: &DynarecConfig,
    cache: &BlockCache,
    block_pc: u32,
    block_is_idle: bool,
    target: u32,
) -> LinkDecision {

    if !config.direct_linking || BiosHle::is_hooked(target) || !cache.is_indexable(target) {
        return LinkDecision::Never;
    }

    // An idle loop has to come back so it can be fast-forwarded.
    if block_is_idle && target == block_pc {
        return LinkDecision::Never;
    }

    match cache.lookup(target) {
        Some(block) => LinkDecision::Direct(block.body),
        None => LinkDecision::Deferred,
    }
}

/// Points every exit waiting for `pc` at the body of its new block. Returns
/// how many were patched.
pub fn resolve_patches(code: &mut CodeBuffer, patches: &mut PatchSiteList, pc: u32, body: CodeAddr) -> u64 {
    let mut patched = 0;
    for site in patches.take_for(pc) {
        if code.patch_target(site, body) {
            patched += 1;
        }
    }
    if patched > 0 {
        debug!("linked {} exits to block {:#010x}", patched, pc);
    }
    patched
}
