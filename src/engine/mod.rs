/// Script execution backends
///
/// The loader only needs the `Execute` capability; QuickJS is the backend shipped with yas.
pub mod quickjs;

pub use quickjs::{ModuleGlobals, QuickJsEngine};

use std::collections::BTreeMap;

/// Globals visible to every executed script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predeclared {
    /// Arguments following the tool reference
    pub args: Vec<String>,
    /// Process environment
    pub env: BTreeMap<String, String>,
    /// Canonical tool URI
    pub tool: String,
    /// Fragment of the tool reference (empty when absent)
    pub frag: String,
}
