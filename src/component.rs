// Component Chains
// Object-style decoration: each layer asks its inner node for description and
// cost first, then applies its own adjustment. Adjustments therefore fold
// inner-to-outer, and a multiplicative layer scales everything beneath it.

use anyhow::{ensure, Result};
use std::sync::Arc;

use crate::contracts::Component;
use crate::types::{ShotCount, Size};
use crate::validation::rules;

/// Cost added per extra shot
pub const SHOT_COST: f64 = 0.6;

/// Undecorated component with a fixed description and cost
#[derive(Debug, Clone, PartialEq)]
pub struct BaseComponent {
    description: String,
    cost: f64,
}

impl BaseComponent {
    pub fn new(description: impl Into<String>, cost: f64) -> Result<Self> {
        let description = description.into();
        ensure!(rules::non_empty(&description), "Description cannot be empty");
        ensure!(
            rules::non_negative_amount(cost),
            "Base cost must be finite and non-negative, got {cost}"
        );
        Ok(Self { description, cost })
    }
}

impl Component for BaseComponent {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn cost(&self) -> f64 {
        self.cost
    }
}

/// One layer's contribution to description and cost
#[derive(Debug, Clone, PartialEq)]
pub enum Adjustment {
    /// Appends ", {label}" and adds `amount`
    Add { label: String, amount: f64 },
    /// Prefixes the size label and multiplies the accumulated cost
    Size(Size),
    /// Appends an "extra shot(s)" fragment and adds [`SHOT_COST`] per shot
    ExtraShots(ShotCount),
}

impl Adjustment {
    /// Additive adjustment; the amount must be finite and non-negative
    pub fn add(label: impl Into<String>, amount: f64) -> Result<Self> {
        let label = label.into();
        ensure!(rules::non_empty(&label), "Adjustment label cannot be empty");
        ensure!(
            rules::non_negative_amount(amount),
            "Adjustment amount must be finite and non-negative, got {amount}"
        );
        Ok(Self::Add { label, amount })
    }

    pub fn size(size: Size) -> Self {
        Self::Size(size)
    }

    pub fn extra_shots(shots: u32) -> Result<Self> {
        Ok(Self::ExtraShots(ShotCount::new(shots)?))
    }

    fn describe(&self, inner: String) -> String {
        match self {
            Adjustment::Add { label, .. } => format!("{inner}, {label}"),
            Adjustment::Size(size) => format!("{} {inner}", size.label()),
            Adjustment::ExtraShots(shots) if shots.get() == 1 => format!("{inner}, extra shot"),
            Adjustment::ExtraShots(shots) => format!("{inner}, {} extra shots", shots.get()),
        }
    }

    fn cost(&self, inner: f64) -> f64 {
        match self {
            Adjustment::Add { amount, .. } => inner + amount,
            Adjustment::Size(size) => inner * size.factor(),
            Adjustment::ExtraShots(shots) => inner + SHOT_COST * shots.get() as f64,
        }
    }
}

/// A component wrapped in one adjustment
pub struct Adjusted {
    inner: Arc<dyn Component>,
    adjustment: Adjustment,
}

impl Adjusted {
    pub fn new(inner: Arc<dyn Component>, adjustment: Adjustment) -> Self {
        Self { inner, adjustment }
    }

    pub fn adjustment(&self) -> &Adjustment {
        &self.adjustment
    }
}

impl Component for Adjusted {
    fn describe(&self) -> String {
        self.adjustment.describe(self.inner.describe())
    }

    fn cost(&self) -> f64 {
        self.adjustment.cost(self.inner.cost())
    }
}

/// Immutable chain of adjustments around a base component.
///
/// `wrap` returns a new chain and leaves `self` untouched, so several chains
/// can share a common inner prefix.
#[derive(Clone)]
pub struct ComponentChain {
    head: Arc<dyn Component>,
    depth: usize,
}

impl ComponentChain {
    pub fn build(base: impl Component + 'static) -> Self {
        Self {
            head: Arc::new(base),
            depth: 0,
        }
    }

    pub fn wrap(&self, adjustment: Adjustment) -> Self {
        Self {
            head: Arc::new(Adjusted::new(Arc::clone(&self.head), adjustment)),
            depth: self.depth + 1,
        }
    }

    /// Number of adjustment layers above the base
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn as_component(&self) -> Arc<dyn Component> {
        Arc::clone(&self.head)
    }
}

impl std::fmt::Debug for ComponentChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentChain")
            .field("description", &self.describe())
            .field("cost", &self.cost())
            .field("depth", &self.depth)
            .finish()
    }
}

impl Component for ComponentChain {
    fn describe(&self) -> String {
        self.head.describe()
    }

    fn cost(&self) -> f64 {
        self.head.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ComponentChain {
        ComponentChain::build(BaseComponent::new("Simple coffee", 2.0).unwrap())
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_additive_then_size() {
        let chain = base()
            .wrap(Adjustment::add("milk", 0.5).unwrap())
            .wrap(Adjustment::size(Size::Large));
        assert!(close(chain.cost(), 3.25));
        assert_eq!(chain.describe(), "Large Simple coffee, milk");
        assert_eq!(chain.depth(), 2);
    }

    #[test]
    fn test_size_then_additive() {
        let chain = base()
            .wrap(Adjustment::size(Size::Large))
            .wrap(Adjustment::add("milk", 0.5).unwrap());
        assert!(close(chain.cost(), 3.1));
        assert_eq!(chain.describe(), "Large Simple coffee, milk");
    }

    #[test]
    fn test_extra_shot_wording() {
        let one = base().wrap(Adjustment::extra_shots(1).unwrap());
        let two = base().wrap(Adjustment::extra_shots(2).unwrap());
        assert_eq!(one.describe(), "Simple coffee, extra shot");
        assert_eq!(two.describe(), "Simple coffee, 2 extra shots");
        assert!(close(two.cost(), 3.2));
        assert!(Adjustment::extra_shots(0).is_err());
    }

    #[test]
    fn test_shared_prefix_is_untouched() {
        let with_milk = base().wrap(Adjustment::add("milk", 0.5).unwrap());
        let whipped = with_milk.wrap(Adjustment::add("whip", 0.7).unwrap());
        let vanilla = with_milk.wrap(Adjustment::add("vanilla", 0.3).unwrap());

        assert_eq!(with_milk.describe(), "Simple coffee, milk");
        assert!(close(whipped.cost(), 3.2));
        assert!(close(vanilla.cost(), 2.8));
    }

    #[test]
    fn test_invalid_amounts_rejected() {
        assert!(BaseComponent::new("", 1.0).is_err());
        assert!(BaseComponent::new("Tea", -1.0).is_err());
        assert!(Adjustment::add("milk", f64::INFINITY).is_err());
    }
}
