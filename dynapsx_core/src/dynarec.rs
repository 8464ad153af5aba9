// SPDX-License-Identifier: GPL-3.0
// dynarec.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

// The dynamic recompiler. Guest code is scanned into blocks, analysed,
// translated into the virtual host ISA through an `InstructionEmitter`, cached
// by guest address and run by the host executor. Blocks are linked to each
// other as their successors get compiled.

/// The virtual host instruction set.
pub mod host;

/// Storage for translated code.
pub mod code_buffer;

/// The emitter trait and its implementation for the virtual host ISA.
pub mod emitter;

/// Compile-time constant tracking for guest registers.
pub mod consts;

/// Guest instruction decoding.
pub mod decode;

/// Block scanning, liveness, load delay and cycle analysis.
pub mod analysis;

/// The block index, the jump hash table and pending links.
pub mod block_cache;

pub mod stats;

/// Translator state owned by one machine.
pub mod context;

/// Direct block linking.
pub mod linker;

mod codegen;
mod memory_access;
mod translate;

/// Block compilation.
pub mod compiler;

/// The host executor.
pub mod executor;

/// The dispatch loop.
pub mod dispatch;

pub use block_cache::{BlockCache, BlockEntry};
pub use context::TranslatorContext;
pub use dispatch::{Dispatcher, StepOutcome};
pub use emitter::{InstructionEmitter, ThreadedEmitter};
pub use executor::BlockExit;
pub use stats::DynarecStats;
