//! Resolved bindings of one type.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::binding::declaration::DeclId;
use crate::domain::ParamType;

/// Index of a binding inside its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BindingId(pub(crate) usize);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding-{}", self.0)
    }
}

/// A target method together with every declaration that wraps it.
#[derive(Debug, Clone)]
pub struct Binding {
    pub(crate) id: BindingId,
    /// Index of the target in the descriptor's method list.
    pub(crate) method_index: usize,
    pub(crate) target: String,
    pub(crate) params: Vec<ParamType>,
    pub(crate) result: ParamType,
    pub(crate) begins: Vec<DeclId>,
    pub(crate) ends: Vec<DeclId>,
}

impl Binding {
    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn result(&self) -> ParamType {
        self.result
    }

    pub fn begins(&self) -> &[DeclId] {
        &self.begins
    }

    pub fn ends(&self) -> &[DeclId] {
        &self.ends
    }
}

/// Serializable view of one binding, for inspecting what a weave installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingSummary {
    pub target: String,
    pub params: Vec<String>,
    pub result: String,
    pub begins: Vec<String>,
    pub ends: Vec<String>,
}

/// Read-only after construction; lookups need no locking.
#[derive(Debug, Clone)]
pub struct BindingTable {
    type_name: String,
    bindings: Vec<Binding>,
    by_decl: HashMap<DeclId, BindingId>,
}

impl BindingTable {
    pub(crate) fn new(type_name: impl Into<String>, bindings: Vec<Binding>) -> Self {
        let mut by_decl = HashMap::new();
        for binding in &bindings {
            for decl in binding.begins.iter().chain(binding.ends.iter()) {
                by_decl.insert(decl.clone(), binding.id);
            }
        }
        Self {
            type_name: type_name.into(),
            bindings,
            by_decl,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn lookup(&self, decl: &DeclId) -> Option<&Binding> {
        let id = self.by_decl.get(decl)?;
        self.bindings.get(id.0)
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn declarations(&self) -> impl Iterator<Item = &DeclId> {
        self.by_decl.keys()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn summary(&self) -> Vec<BindingSummary> {
        self.bindings
            .iter()
            .map(|b| BindingSummary {
                target: b.target.clone(),
                params: b.params.iter().map(|p| p.name().to_string()).collect(),
                result: b.result.name().to_string(),
                begins: b.begins.iter().map(ToString::to_string).collect(),
                ends: b.ends.iter().map(ToString::to_string).collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::declaration::Completion;
    use crate::domain::Args;

    fn table() -> BindingTable {
        let binding = Binding {
            id: BindingId(0),
            method_index: 0,
            target: "test".to_string(),
            params: <(i32, bool)>::signature(),
            result: ParamType::of::<i32>(),
            begins: vec![
                DeclId::begin("begin_test", Completion::None),
                DeclId::begin("begin_test", Completion::Callback),
            ],
            ends: vec![DeclId::end("end_test")],
        };
        BindingTable::new("Sample", vec![binding])
    }

    #[test]
    fn every_declaration_maps_to_its_binding() {
        let table = table();
        for decl in [
            DeclId::begin("begin_test", Completion::None),
            DeclId::begin("begin_test", Completion::Callback),
            DeclId::end("end_test"),
        ] {
            assert_eq!(table.lookup(&decl).map(Binding::id), Some(BindingId(0)));
        }
        assert!(table
            .lookup(&DeclId::begin("begin_test", Completion::CallbackState))
            .is_none());
        assert_eq!(table.declarations().count(), 3);
    }

    #[test]
    fn summary_is_serializable() {
        let summary = table().summary();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json[0]["target"], "test");
        assert_eq!(json[0]["params"], serde_json::json!(["i32", "bool"]));
        assert_eq!(json[0]["result"], "i32");
        assert_eq!(json[0]["ends"], serde_json::json!(["end_test(handle)"]));
    }
}
