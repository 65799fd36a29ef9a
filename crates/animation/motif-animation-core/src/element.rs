//! Opaque element handles.
//!
//! The engine never touches a host element directly; every per-element record
//! (trigger states, removal metadata, style arenas, player rosters) lives in
//! a side table keyed by `ElementId`. The host owns the actual arena and
//! hands out keys through its driver implementation.

use slotmap::new_key_type;

new_key_type! {
    /// Handle to one element of the host tree.
    pub struct ElementId;
}
