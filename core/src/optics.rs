//! Projection values linking a parent feature to a child feature.
//!
//! A [`StateLens`] focuses a parent state on a child slice that is always present.
//! An [`ActionPrism`] picks the child's actions out of the parent's action type and
//! wraps child actions back up. Both are plain values built from function pointers,
//! so they are `Copy` and free to pass around.
//!
//! # Example
//!
//! ```
//! use composable_store_core::optics::{ActionPrism, StateLens};
//!
//! #[derive(Debug, Default)]
//! struct AppState {
//!     count: i32,
//!     title: String,
//! }
//!
//! #[derive(Debug, PartialEq)]
//! enum AppAction {
//!     Counter(i32),
//!     Rename(String),
//! }
//!
//! let count = StateLens::new(
//!     |s: &AppState| &s.count,
//!     |s: &mut AppState| &mut s.count,
//! );
//! let counter = ActionPrism::new(
//!     |a: AppAction| match a {
//!         AppAction::Counter(n) => Some(n),
//!         AppAction::Rename(_) => None,
//!     },
//!     AppAction::Counter,
//! );
//!
//! let mut state = AppState::default();
//! count.set(&mut state, 3);
//! assert_eq!(*count.get(&state), 3);
//!
//! assert_eq!(counter.extract(AppAction::Counter(1)), Some(1));
//! assert_eq!(counter.extract(AppAction::Rename("x".into())), None);
//! assert_eq!(counter.embed(2), AppAction::Counter(2));
//! ```

use std::fmt;

/// Total getter plus in-place write access from a parent state `G` to a slice `L`.
pub struct StateLens<G, L> {
    get: fn(&G) -> &L,
    get_mut: fn(&mut G) -> &mut L,
}

impl<G, L> StateLens<G, L> {
    /// Build a lens from its two accessors.
    #[must_use]
    pub const fn new(get: fn(&G) -> &L, get_mut: fn(&mut G) -> &mut L) -> Self {
        Self { get, get_mut }
    }

    /// Borrow the slice.
    pub fn get<'a>(&self, parent: &'a G) -> &'a L {
        (self.get)(parent)
    }

    /// Mutably borrow the slice.
    pub fn get_mut<'a>(&self, parent: &'a mut G) -> &'a mut L {
        (self.get_mut)(parent)
    }

    /// Replace the slice, leaving the rest of the parent untouched.
    pub fn set(&self, parent: &mut G, value: L) {
        *(self.get_mut)(parent) = value;
    }
}

impl<G> StateLens<G, G> {
    /// The lens focusing a state on itself.
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(identity_ref, identity_mut)
    }
}

fn identity_ref<G>(state: &G) -> &G {
    state
}

fn identity_mut<G>(state: &mut G) -> &mut G {
    state
}

impl<G, L> Clone for StateLens<G, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G, L> Copy for StateLens<G, L> {}

impl<G, L> fmt::Debug for StateLens<G, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateLens")
            .field("parent", &std::any::type_name::<G>())
            .field("slice", &std::any::type_name::<L>())
            .finish()
    }
}

/// Partial extraction of a child action `L` from a parent action `G`, plus the
/// total injection back.
pub struct ActionPrism<G, L> {
    extract: fn(G) -> Option<L>,
    embed: fn(L) -> G,
}

impl<G, L> ActionPrism<G, L> {
    /// Build a prism from its extractor and injector.
    #[must_use]
    pub const fn new(extract: fn(G) -> Option<L>, embed: fn(L) -> G) -> Self {
        Self { extract, embed }
    }

    /// The child action carried by `action`, if it carries one.
    pub fn extract(&self, action: G) -> Option<L> {
        (self.extract)(action)
    }

    /// Wrap a child action into the parent action type.
    pub fn embed(&self, action: L) -> G {
        (self.embed)(action)
    }

    /// The injector as a plain function pointer, for mapping effect outputs.
    #[must_use]
    pub const fn embedder(&self) -> fn(L) -> G {
        self.embed
    }
}

impl<G> ActionPrism<G, G> {
    /// The prism matching every action unchanged.
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(Some, identity_value)
    }
}

fn identity_value<G>(action: G) -> G {
    action
}

impl<G, L> Clone for ActionPrism<G, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G, L> Copy for ActionPrism<G, L> {}

impl<G, L> fmt::Debug for ActionPrism<G, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionPrism")
            .field("parent", &std::any::type_name::<G>())
            .field("child", &std::any::type_name::<L>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Parent {
        child: i32,
        other: String,
    }

    #[test]
    fn test_lens_set_leaves_rest_untouched() {
        let lens = StateLens::new(|p: &Parent| &p.child, |p: &mut Parent| &mut p.child);
        let mut parent = Parent {
            child: 1,
            other: "kept".to_string(),
        };

        lens.set(&mut parent, 9);
        *lens.get_mut(&mut parent) += 1;

        assert_eq!(*lens.get(&parent), 10);
        assert_eq!(parent.other, "kept");
    }

    #[test]
    fn test_identity_optics() {
        let lens = StateLens::<Parent, Parent>::identity();
        let prism = ActionPrism::<u8, u8>::identity();
        let parent = Parent::default();

        assert_eq!(lens.get(&parent), &parent);
        assert_eq!(prism.extract(4), Some(4));
        assert_eq!(prism.embed(4), 4);
    }
}
