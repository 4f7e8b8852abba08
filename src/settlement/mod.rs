// ============================================================================
// Settlement Module - Escrow Engine & Access Guard
// ============================================================================
//
// The transactional core of 8Ball Markets:
//   - engine: the five atomic bet operations (propose, accept, resolve,
//     dispute, cancel/expire) plus the read views built on them
//   - access: actor resolution and permission checks for every mutating
//     operation (self / assigned arbiter / admin)
//
// ============================================================================

pub mod access;
pub mod engine;

pub use access::*;
pub use engine::*;
