//! `Registry`: the only mutable global state of the analysis.
//!
//! Workers read their own method's current [`Model`] at iteration start,
//! compute a new `Model` purely locally, and then atomically `set` it.
//! `DashMap` gives us the concurrent get-or-insert/update this requires,
//! mirroring how [`crate::intern::Interner`] uses it for concurrent interning.

use crate::intern::Interned;
use crate::ir::{Field, Method};
use crate::model::{FieldModel, Model};
use dashmap::DashMap;

#[derive(Default)]
pub struct Registry {
    methods: DashMap<Interned<Method>, Model>,
    fields: DashMap<Interned<Field>, FieldModel>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, method: &Interned<Method>) -> Model {
        self.methods.get(method).map(|m| m.clone()).unwrap_or_else(Model::bottom)
    }

    pub fn set(&self, method: Interned<Method>, model: Model) {
        self.methods.insert(method, model);
    }

    pub fn get_field(&self, field: &Interned<Field>) -> FieldModel {
        self.fields.get(field).map(|m| m.clone()).unwrap_or_else(FieldModel::bottom)
    }

    pub fn set_field(&self, field: Interned<Field>, model: FieldModel) {
        self.fields.insert(field, model);
    }

    pub fn methods(&self) -> Vec<Interned<Method>> {
        self.methods.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Pointwise join of every entry present in either registry.
    pub fn join_with(&self, other: &Registry) -> Registry {
        let joined = Registry::new();
        for entry in self.methods.iter() {
            joined.methods.insert(entry.key().clone(), entry.value().clone());
        }
        for entry in other.methods.iter() {
            let merged = match joined.methods.get(entry.key()) {
                Some(existing) => existing.join_with(entry.value()),
                None => entry.value().clone(),
            };
            joined.methods.insert(entry.key().clone(), merged);
        }
        for entry in self.fields.iter() {
            joined.fields.insert(entry.key().clone(), entry.value().clone());
        }
        for entry in other.fields.iter() {
            let merged = match joined.fields.get(entry.key()) {
                Some(existing) => existing.join_with(entry.value()),
                None => entry.value().clone(),
            };
            joined.fields.insert(entry.key().clone(), merged);
        }
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    fn method(name: &str) -> Interned<Method> {
        let interner = Interner::new();
        interner.intern(Method {
            signature: name.to_string(),
            class_name: "A".to_string(),
            parameter_types: vec![],
            return_type: "V".to_string(),
            is_static: true,
        })
    }

    #[test]
    fn get_on_empty_registry_is_bottom() {
        let registry = Registry::new();
        let model = registry.get(&method("A.f()V"));
        assert!(model.is_bottom());
    }

    #[test]
    fn set_then_get_round_trips() {
        let registry = Registry::new();
        let m = method("A.f()V");
        let mut model = Model::bottom();
        model.modes.skip_analysis = true;
        registry.set(m.clone(), model.clone());
        assert!(registry.get(&m).modes.skip_analysis);
    }
}
