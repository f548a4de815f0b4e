//! # Order model: the unit of work flowing through the pipeline.
//!
//! An [`Order`] is created by an emitter, then owned by exactly one queue or
//! one handler at any instant until it is completed by packaging or fails at
//! some stage. All attributes are fixed at creation; the engine's ledger
//! stamps start/completion times on its own tracking entry, not on the value
//! moving through the queues.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Opaque unique order identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id source shared by all emitters of one engine run.
#[derive(Debug, Default)]
pub struct OrderSequence {
    next: AtomicU64,
}

impl OrderSequence {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> OrderId {
        OrderId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Drink recipe family; drives service-time multipliers downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Complexity {
    MilkTea,
    CoffeeWithTapioca,
    SpecialMenu,
}

impl Complexity {
    /// Relative effort of the recipe against plain milk tea.
    pub fn multiplier(&self) -> f64 {
        match self {
            Complexity::MilkTea => 1.0,
            Complexity::CoffeeWithTapioca => 1.5,
            Complexity::SpecialMenu => 2.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Complexity::MilkTea => "milk-tea",
            Complexity::CoffeeWithTapioca => "coffee-with-tapioca",
            Complexity::SpecialMenu => "special-menu",
        }
    }
}

/// Cup size; carries every size-derived constant the stages need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CupSize {
    Small,
    Medium,
    Large,
}

impl CupSize {
    pub fn volume_ml(&self) -> u32 {
        match self {
            CupSize::Small => 500,
            CupSize::Medium => 700,
            CupSize::Large => 1000,
        }
    }

    /// Brew effort relative to a small cup.
    pub fn multiplier(&self) -> f64 {
        match self {
            CupSize::Small => 1.0,
            CupSize::Medium => 1.2,
            CupSize::Large => 1.5,
        }
    }

    /// Packaging takes disproportionally longer for big cups.
    pub fn packaging_multiplier(&self) -> f64 {
        match self {
            CupSize::Small => 1.0,
            CupSize::Medium => 1.3,
            CupSize::Large => 1.7,
        }
    }

    /// Recommended tapioca portions for this size.
    pub fn tapioca_portions(&self) -> u8 {
        match self {
            CupSize::Small => 1,
            CupSize::Medium => 2,
            CupSize::Large => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CupSize::Small => "small",
            CupSize::Medium => "medium",
            CupSize::Large => "large",
        }
    }
}

/// A pipeline stage. Used to tag worker counters and bus events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    BasePreparation,
    TapiocaCooking,
    Toppings,
    QualityControl,
    Packaging,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::BasePreparation,
        Stage::TapiocaCooking,
        Stage::Toppings,
        Stage::QualityControl,
        Stage::Packaging,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Stage::BasePreparation => "base-preparation",
            Stage::TapiocaCooking => "tapioca-cooking",
            Stage::Toppings => "toppings",
            Stage::QualityControl => "quality-control",
            Stage::Packaging => "packaging",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A customer order.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub complexity: Complexity,
    pub size: CupSize,
    /// Requested tapioca toppings, 0 to 3 portions.
    pub toppings_count: u8,
    pub is_group: bool,
    /// Number of drinks: 1 for regular orders, 2 to 5 for group orders.
    pub quantity: u8,
    /// Group orders only; regular orders never carry the discount.
    pub student_discount: bool,
    pub created_at: Instant,
}

impl Order {
    /// Combined effort score of recipe and cup size.
    pub fn complexity_score(&self) -> f64 {
        self.complexity.multiplier() * self.size.multiplier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_hands_out_unique_increasing_ids() {
        let seq = OrderSequence::new();
        let a = seq.next_id();
        let b = seq.next_id();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn complexity_score_combines_recipe_and_size() {
        let order = Order {
            id: OrderId(1),
            complexity: Complexity::SpecialMenu,
            size: CupSize::Medium,
            toppings_count: 2,
            is_group: false,
            quantity: 1,
            student_discount: false,
            created_at: Instant::now(),
        };
        assert!((order.complexity_score() - 2.4).abs() < 1e-9);
    }

    #[test]
    fn size_constants_match_the_menu() {
        assert_eq!(CupSize::Small.volume_ml(), 500);
        assert_eq!(CupSize::Large.tapioca_portions(), 3);
        assert!((CupSize::Medium.packaging_multiplier() - 1.3).abs() < 1e-9);
        assert!((Complexity::CoffeeWithTapioca.multiplier() - 1.5).abs() < 1e-9);
    }
}
