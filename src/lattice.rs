//! Minimal lattice trait so [`crate::tree::Tree`] can be generic over the
//! value domain it stores (used for `Taint`).

pub trait Lattice: Clone + PartialEq {
    fn bottom() -> Self;
    fn is_bottom(&self) -> bool;
    fn leq(&self, other: &Self) -> bool;
    fn join_with(&self, other: &Self) -> Self;
}

impl Lattice for crate::taint::Taint {
    fn bottom() -> Self {
        crate::taint::Taint::bottom()
    }

    fn is_bottom(&self) -> bool {
        crate::taint::Taint::is_bottom(self)
    }

    fn leq(&self, other: &Self) -> bool {
        crate::taint::Taint::leq(self, other)
    }

    fn join_with(&self, other: &Self) -> Self {
        crate::taint::Taint::join_with(self, other)
    }
}
