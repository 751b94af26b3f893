//! Selector subscriptions over a live [`ElementTree`].
//!
//! A [`SelectorObserver`] is constructed and owned by whoever owns the
//! tree; no shared global instance exists. Each subscription gets its own
//! stream: every current match is emitted synchronously at subscribe time
//! and later matches are emitted as mutation records are fed in. An element
//! is emitted at most once per subscription, even when it is detached and
//! re-attached.

use crate::selector::{SelectorError, SelectorList};
use crate::tree::{ElementTree, MutationRecord, NodeId};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Handle for one active subscription, used to dispose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The element's state at emission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub node: NodeId,
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl ElementSnapshot {
    #[must_use]
    pub fn capture(tree: &ElementTree, node: NodeId) -> Self {
        let element = tree.element(node);
        Self {
            node,
            tag: element.tag().to_owned(),
            id: element.id().map(str::to_owned),
            classes: element.classes().map(str::to_owned).collect(),
        }
    }
}

struct Subscription {
    container: NodeId,
    selector: SelectorList,
    seen: HashSet<NodeId>,
    sender: mpsc::UnboundedSender<ElementSnapshot>,
}

impl Subscription {
    /// Emit `node` if it matches, is new to this subscription, and is not
    /// the container itself. Returns `false` once the receiver is gone.
    fn emit(&mut self, tree: &ElementTree, node: NodeId) -> bool {
        if node == self.container || !self.selector.matches(tree.element(node)) {
            return true;
        }
        if !self.seen.insert(node) {
            return true;
        }
        self.sender.send(ElementSnapshot::capture(tree, node)).is_ok()
    }
}

/// Watches an element tree for elements matching registered selectors.
#[derive(Default)]
pub struct SelectorObserver {
    next_subscription: u64,
    subscriptions: BTreeMap<u64, Subscription>,
}

impl SelectorObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to elements under `container` matching `selector`.
    ///
    /// Every element already matching is emitted synchronously before this
    /// returns. The stream ends when the subscription is disposed.
    pub fn observe_selector(
        &mut self,
        tree: &ElementTree,
        container: NodeId,
        selector: &str,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<ElementSnapshot>), SelectorError> {
        let selector = SelectorList::parse(selector)?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut subscription = Subscription {
            container,
            selector,
            seen: HashSet::new(),
            sender,
        };
        for node in tree.descendants(container) {
            subscription.emit(tree, node);
        }

        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscriptions.insert(id, subscription);
        debug!(subscription = id, "selector subscription added");
        Ok((SubscriptionId(id), receiver))
    }

    /// Feed a batch of mutation records.
    ///
    /// Each record's target subtree is re-scanned for every subscription;
    /// new matches still attached under the subscription's container are
    /// emitted. Subscriptions whose receivers have been dropped are removed.
    pub fn process_mutations(&mut self, tree: &ElementTree, records: &[MutationRecord]) {
        let mut dead = Vec::new();

        for (&id, subscription) in &mut self.subscriptions {
            'records: for record in records {
                for node in tree.descendants(record.target) {
                    if !tree.contains(subscription.container, node) {
                        continue;
                    }
                    if !subscription.emit(tree, node) {
                        dead.push(id);
                        break 'records;
                    }
                }
            }
        }

        for id in dead {
            self.subscriptions.remove(&id);
            debug!(subscription = id, "selector subscription receiver dropped");
        }
    }

    /// Drop a subscription, ending its stream. Unknown ids are a no-op
    /// returning `false`.
    pub fn dispose(&mut self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.remove(&id.0).is_some();
        if removed {
            debug!(subscription = id.0, "selector subscription disposed");
        }
        removed
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}
