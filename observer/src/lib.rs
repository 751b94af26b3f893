//! Selector-driven observation of element trees.
//!
//! Mirrors the host-page integration problem: given a container and a CSS
//! selector, surface every matching element that exists now or appears
//! later, exactly once per subscription, with explicit disposal.

pub mod observe;
pub mod selector;
pub mod tree;

pub use observe::{ElementSnapshot, SelectorObserver, SubscriptionId};
pub use selector::{SelectorError, SelectorList};
pub use tree::{Element, ElementTree, MutationRecord, NodeId, TreeError};
