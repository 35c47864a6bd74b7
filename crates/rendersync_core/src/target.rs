//! # Render Targets
//!
//! A target is an opaque handle for one renderable surface. The coalescer
//! never looks inside it; identity is handle equality.
//!
//! Targets only need to be registered to take part in the "all" operations.
//! Direct requests work for any handle.

use std::collections::HashMap;

/// Opaque handle identifying one render surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u64);

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// What kind of view a target shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TargetClass {
    /// Slice / planar view.
    TwoD,
    /// Volume / scene view.
    ThreeD,
    /// Anything else; only matched by [`RequestType::All`].
    #[default]
    Other,
}

/// Filter used by the "all" operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RequestType {
    /// Every registered target.
    #[default]
    All,
    /// Only 2D targets.
    TwoD,
    /// Only 3D targets.
    ThreeD,
}

impl RequestType {
    /// Returns true if a target of `class` falls under this filter.
    #[inline]
    #[must_use]
    pub const fn matches(self, class: TargetClass) -> bool {
        match self {
            Self::All => true,
            Self::TwoD => matches!(class, TargetClass::TwoD),
            Self::ThreeD => matches!(class, TargetClass::ThreeD),
        }
    }
}

/// Tells the coalescer which class a target belongs to.
pub trait TargetClassifier: Send {
    /// Returns the class of `target`.
    fn classify(&self, target: TargetId) -> TargetClass;
}

impl<F> TargetClassifier for F
where
    F: Fn(TargetId) -> TargetClass + Send,
{
    fn classify(&self, target: TargetId) -> TargetClass {
        self(target)
    }
}

/// Classifies every target the same way.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformClassifier(pub TargetClass);

impl TargetClassifier for UniformClassifier {
    fn classify(&self, _target: TargetId) -> TargetClass {
        self.0
    }
}

/// Explicit table of target classes. Unknown targets are [`TargetClass::Other`].
#[derive(Clone, Debug, Default)]
pub struct MapClassifier {
    classes: HashMap<TargetId, TargetClass>,
}

impl MapClassifier {
    /// Creates an empty classifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the class of a target, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, target: TargetId, class: TargetClass) -> Self {
        self.classes.insert(target, class);
        self
    }

    /// Records or replaces the class of a target.
    pub fn set(&mut self, target: TargetId, class: TargetClass) {
        self.classes.insert(target, class);
    }
}

impl TargetClassifier for MapClassifier {
    fn classify(&self, target: TargetId) -> TargetClass {
        self.classes.get(&target).copied().unwrap_or_default()
    }
}

/// Ordered set of registered targets.
///
/// Registration order is preserved; it decides the order of the "all"
/// operations and of renders within one pass.
#[derive(Clone, Debug, Default)]
pub struct TargetRegistry {
    targets: Vec<TargetId>,
}

impl TargetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target. Returns false if it was already registered.
    pub fn add(&mut self, target: TargetId) -> bool {
        if self.contains(target) {
            return false;
        }
        self.targets.push(target);
        true
    }

    /// Removes a target, keeping the order of the rest. Returns false if absent.
    pub fn remove(&mut self, target: TargetId) -> bool {
        match self.position(target) {
            Some(index) => {
                self.targets.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns true if the target is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, target: TargetId) -> bool {
        self.targets.contains(&target)
    }

    /// Registration index of a target.
    #[must_use]
    pub fn position(&self, target: TargetId) -> Option<usize> {
        self.targets.iter().position(|t| *t == target)
    }

    /// Registered targets in registration order.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[TargetId] {
        &self.targets
    }

    /// Number of registered targets.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns true if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Registered targets whose class matches `filter`, in registration order.
    pub fn matching<'a>(
        &'a self,
        filter: RequestType,
        classifier: &'a dyn TargetClassifier,
    ) -> impl Iterator<Item = TargetId> + 'a {
        self.targets
            .iter()
            .copied()
            .filter(move |t| filter.matches(classifier.classify(*t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_set_semantics() {
        let mut registry = TargetRegistry::new();
        assert!(registry.add(TargetId(1)));
        assert!(!registry.add(TargetId(1)));
        assert!(registry.add(TargetId(2)));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(TargetId(1)));
        assert!(!registry.remove(TargetId(1)));
        assert_eq!(registry.as_slice(), &[TargetId(2)]);
    }

    #[test]
    fn test_registry_keeps_order_after_removal() {
        let mut registry = TargetRegistry::new();
        for id in [5, 3, 9, 1] {
            registry.add(TargetId(id));
        }
        registry.remove(TargetId(3));
        assert_eq!(registry.as_slice(), &[TargetId(5), TargetId(9), TargetId(1)]);
        assert_eq!(registry.position(TargetId(1)), Some(2));
    }

    #[test]
    fn test_matching_filters_by_class() {
        let mut registry = TargetRegistry::new();
        for id in 1..=4 {
            registry.add(TargetId(id));
        }
        let classifier = MapClassifier::new()
            .with(TargetId(1), TargetClass::TwoD)
            .with(TargetId(2), TargetClass::ThreeD)
            .with(TargetId(3), TargetClass::TwoD);

        let two_d: Vec<_> = registry.matching(RequestType::TwoD, &classifier).collect();
        let three_d: Vec<_> = registry.matching(RequestType::ThreeD, &classifier).collect();
        let all: Vec<_> = registry.matching(RequestType::All, &classifier).collect();

        assert_eq!(two_d, vec![TargetId(1), TargetId(3)]);
        assert_eq!(three_d, vec![TargetId(2)]);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_closure_classifier() {
        let classifier = |t: TargetId| {
            if t.0 % 2 == 0 {
                TargetClass::ThreeD
            } else {
                TargetClass::TwoD
            }
        };
        assert_eq!(classifier.classify(TargetId(4)), TargetClass::ThreeD);
        assert_eq!(classifier.classify(TargetId(7)), TargetClass::TwoD);
    }
}
