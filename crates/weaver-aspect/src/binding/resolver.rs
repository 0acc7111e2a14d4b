//! Binding resolver: declarations + methods -> `BindingTable`.
//!
//! Resolution runs once per type, before any start call can happen, so every
//! misconfiguration surfaces here and never at call time.
//!
//! # フロー
//! 1. 重複チェック（メソッドシグネチャ / 宣言 identity）
//! 2. start 宣言ごとに target メソッドを決定（名前 + arity、または明示型リスト）
//! 3. await 宣言ごとに、start 宣言が作った binding を探す

use std::collections::HashSet;

use tracing::debug;

use crate::binding::declaration::{DeclKind, Declaration};
use crate::binding::descriptor::TypeDescriptor;
use crate::binding::table::{Binding, BindingId, BindingTable};
use crate::domain::ParamType;
use crate::domain::signature::display_signature;
use crate::error::ConfigurationError;

pub fn resolve<T: 'static>(ty: &TypeDescriptor<T>) -> Result<BindingTable, ConfigurationError> {
    let type_name = ty.type_name().to_string();
    check_duplicates(ty, &type_name)?;

    let mut bindings: Vec<Binding> = Vec::new();

    for decl in ty.declarations() {
        if !matches!(decl.id.kind, DeclKind::Begin(_)) {
            continue;
        }
        let index = resolve_begin(ty, &type_name, decl)?;
        match bindings.iter_mut().find(|b| b.method_index == index) {
            Some(binding) => binding.begins.push(decl.id.clone()),
            None => {
                let method = &ty.methods[index];
                bindings.push(Binding {
                    id: BindingId(bindings.len()),
                    method_index: index,
                    target: method.name.clone(),
                    params: method.params.clone(),
                    result: method.result,
                    begins: vec![decl.id.clone()],
                    ends: Vec::new(),
                });
            }
        }
    }

    for decl in ty.declarations() {
        if decl.id.kind != DeclKind::End {
            continue;
        }
        let position = resolve_end(ty, &type_name, decl, &bindings)?;
        bindings[position].ends.push(decl.id.clone());
    }

    for binding in &bindings {
        debug!(
            type_name = %type_name,
            target = %binding.target,
            signature = %display_signature(&binding.params),
            begins = binding.begins.len(),
            ends = binding.ends.len(),
            "binding resolved"
        );
    }

    Ok(BindingTable::new(type_name, bindings))
}

fn check_duplicates<T>(ty: &TypeDescriptor<T>, type_name: &str) -> Result<(), ConfigurationError> {
    let mut methods = HashSet::new();
    for method in &ty.methods {
        if !methods.insert((method.name.as_str(), method.params.as_slice())) {
            return Err(ConfigurationError::DuplicateMethod {
                type_name: type_name.to_string(),
                name: method.name.clone(),
                signature: display_signature(&method.params),
            });
        }
    }

    let mut decls = HashSet::new();
    for decl in &ty.declarations {
        if !decls.insert(&decl.id) {
            return Err(ConfigurationError::DuplicateDeclaration {
                type_name: type_name.to_string(),
                decl: decl.id.clone(),
            });
        }
    }
    Ok(())
}

/// Returns the index of the target method in the descriptor.
fn resolve_begin<T>(
    ty: &TypeDescriptor<T>,
    type_name: &str,
    decl: &Declaration,
) -> Result<usize, ConfigurationError> {
    let target = decl
        .target_name()
        .ok_or_else(|| ConfigurationError::Untargeted {
            type_name: type_name.to_string(),
            decl: decl.id.clone(),
        })?;

    let named: Vec<usize> = ty
        .methods
        .iter()
        .enumerate()
        .filter(|(_, m)| m.name == target)
        .map(|(i, _)| i)
        .collect();

    let explicit = decl.explicit.param_types.as_deref();
    let candidates: Vec<usize> = match explicit {
        Some(types) => named
            .iter()
            .copied()
            .filter(|&i| ty.methods[i].params.as_slice() == types)
            .collect(),
        None => named
            .iter()
            .copied()
            .filter(|&i| ty.methods[i].params.len() == decl.params.len())
            .collect(),
    };

    let index = match candidates.as_slice() {
        [] => {
            return Err(ConfigurationError::TargetNotFound {
                type_name: type_name.to_string(),
                decl: decl.id.clone(),
                target,
                signature: display_signature(explicit.unwrap_or(&decl.params)),
            });
        }
        [index] => *index,
        many => {
            return Err(ConfigurationError::AmbiguousTarget {
                type_name: type_name.to_string(),
                decl: decl.id.clone(),
                candidates: many
                    .iter()
                    .map(|&i| format!("{}{}", target, display_signature(&ty.methods[i].params)))
                    .collect(),
                target,
            });
        }
    };

    let method = &ty.methods[index];
    if method.params != decl.params {
        return Err(ConfigurationError::SignatureMismatch {
            type_name: type_name.to_string(),
            decl: decl.id.clone(),
            target,
            declared: display_signature(&decl.params),
            actual: display_signature(&method.params),
        });
    }
    Ok(index)
}

/// Returns the position of the binding the await declaration joins.
fn resolve_end<T>(
    ty: &TypeDescriptor<T>,
    type_name: &str,
    decl: &Declaration,
    bindings: &[Binding],
) -> Result<usize, ConfigurationError> {
    let target = decl
        .target_name()
        .ok_or_else(|| ConfigurationError::Untargeted {
            type_name: type_name.to_string(),
            decl: decl.id.clone(),
        })?;
    let explicit = decl.explicit.param_types.as_deref();

    let candidates: Vec<usize> = bindings
        .iter()
        .enumerate()
        .filter(|(_, b)| b.target == target)
        .filter(|(_, b)| explicit.is_none_or(|types| b.params.as_slice() == types))
        .map(|(i, _)| i)
        .collect();

    let position = match candidates.as_slice() {
        [] => {
            let method_exists = ty.methods.iter().any(|m| {
                m.name == target && explicit.is_none_or(|types| m.params.as_slice() == types)
            });
            return Err(if method_exists {
                ConfigurationError::OrphanedEnd {
                    type_name: type_name.to_string(),
                    decl: decl.id.clone(),
                    target,
                }
            } else {
                ConfigurationError::TargetNotFound {
                    type_name: type_name.to_string(),
                    decl: decl.id.clone(),
                    target,
                    signature: explicit.map(display_signature).unwrap_or_default(),
                }
            });
        }
        [position] => *position,
        many => {
            return Err(ConfigurationError::AmbiguousTarget {
                type_name: type_name.to_string(),
                decl: decl.id.clone(),
                candidates: many
                    .iter()
                    .map(|&i| format!("{}{}", target, display_signature(&bindings[i].params)))
                    .collect(),
                target,
            });
        }
    };

    let binding = &bindings[position];
    let declared: Option<ParamType> = decl.result;
    if let Some(declared) = declared
        && declared != binding.result
    {
        return Err(ConfigurationError::ResultMismatch {
            type_name: type_name.to_string(),
            decl: decl.id.clone(),
            target,
            declared: declared.name().to_string(),
            actual: binding.result.name().to_string(),
        });
    }
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::declaration::{Completion, DeclId, ExplicitBinding};
    use crate::domain::Args;
    use rstest::rstest;

    struct Sample;

    fn base() -> TypeDescriptor<Sample> {
        let mut ty = TypeDescriptor::<Sample>::new();
        ty.method("test", |_: &Sample, (v, _s): (i32, Option<String>)| v);
        ty
    }

    #[test]
    fn default_prefix_binds_all_overloads_to_one_target() {
        let mut ty = base();
        ty.declare(Declaration::begin::<(i32, Option<String>)>("begin_test"))
            .declare(Declaration::begin::<(i32, Option<String>)>("begin_test").with_callback())
            .declare(Declaration::begin::<(i32, Option<String>)>("begin_test").with_state())
            .declare(Declaration::end::<i32>("end_test"));

        let table = resolve(&ty).unwrap();
        assert_eq!(table.len(), 1);
        let binding = &table.bindings()[0];
        assert_eq!(binding.target(), "test");
        assert_eq!(binding.begins().len(), 3);
        assert_eq!(binding.ends(), [DeclId::end("end_test")]);
    }

    #[test]
    fn any_name_pair_binds_through_explicit_target() {
        let mut ty = base();
        ty.declare(Declaration::begin::<(i32, Option<String>)>("begin_test"))
            .declare(
                Declaration::begin::<(i32, Option<String>)>("any_name")
                    .with_state()
                    .target("test"),
            )
            .declare(
                Declaration::end::<i32>("any_name")
                    .target("test")
                    .param_types::<(i32, Option<String>)>(),
            );

        let table = resolve(&ty).unwrap();
        assert_eq!(table.len(), 1);
        let begin = table
            .lookup(&DeclId::begin("any_name", Completion::CallbackState))
            .unwrap();
        let end = table.lookup(&DeclId::end("any_name")).unwrap();
        assert_eq!(begin.id(), end.id());
        assert_eq!(begin.target(), "test");
    }

    #[test]
    fn explicit_types_pick_among_overloads() {
        let mut ty = TypeDescriptor::<Sample>::new();
        ty.method("fetch", |_: &Sample, (id,): (u32,)| format!("u32:{id}"))
            .method("fetch", |_: &Sample, (name,): (String,)| format!("name:{name}"));
        ty.declare(
            Declaration::begin::<(String,)>("lookup")
                .with_binding(ExplicitBinding {
                    target: Some("fetch".to_string()),
                    param_types: Some(<(String,)>::signature()),
                }),
        )
        .declare(
            Declaration::end::<String>("lookup")
                .target("fetch")
                .param_types::<(String,)>(),
        );

        let table = resolve(&ty).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.bindings()[0].params(), <(String,)>::signature().as_slice());
        assert_eq!(table.bindings()[0].method_index, 1);
    }

    #[test]
    fn same_arity_overloads_without_types_are_ambiguous() {
        let mut ty = TypeDescriptor::<Sample>::new();
        ty.method("fetch", |_: &Sample, (id,): (u32,)| id.to_string())
            .method("fetch", |_: &Sample, (name,): (String,)| name);
        ty.declare(Declaration::begin::<(String,)>("begin_fetch"));

        let err = resolve(&ty).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::AmbiguousTarget { ref candidates, .. } if candidates.len() == 2
        ));
    }

    #[test]
    fn arity_alone_is_enough_when_only_one_overload_fits() {
        let mut ty = TypeDescriptor::<Sample>::new();
        ty.method("fetch", |_: &Sample, (id,): (u32,)| id.to_string())
            .method("fetch", |_: &Sample, (a, b): (u32, u32)| format!("{a}{b}"));
        ty.declare(Declaration::begin::<(u32, u32)>("begin_fetch"))
            .declare(Declaration::end::<String>("end_fetch"));

        let table = resolve(&ty).unwrap();
        assert_eq!(table.bindings()[0].method_index, 1);
    }

    #[rstest]
    #[case::missing_target(
        Declaration::begin::<(i32, Option<String>)>("begin_missing"),
        "TargetNotFound"
    )]
    #[case::wrong_arity(Declaration::begin::<(i32,)>("begin_test"), "TargetNotFound")]
    #[case::wrong_types(
        Declaration::begin::<(i64, Option<String>)>("begin_test"),
        "SignatureMismatch"
    )]
    #[case::unprefixed(Declaration::begin::<(i32, Option<String>)>("launch"), "Untargeted")]
    #[case::orphaned_end(Declaration::end::<i32>("end_test"), "OrphanedEnd")]
    #[case::end_without_method(Declaration::end::<i32>("end_nothing"), "TargetNotFound")]
    fn resolution_errors(#[case] decl: Declaration, #[case] expected: &str) {
        let mut ty = base();
        ty.declare(decl);
        let err = resolve(&ty).unwrap_err();
        let variant = format!("{err:?}");
        assert!(variant.starts_with(expected), "{variant}");
    }

    #[test]
    fn end_result_type_must_match_target() {
        let mut ty = base();
        ty.declare(Declaration::begin::<(i32, Option<String>)>("begin_test"))
            .declare(Declaration::end::<String>("end_test"));
        let err = resolve(&ty).unwrap_err();
        assert!(matches!(err, ConfigurationError::ResultMismatch { .. }));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut ty = base();
        ty.method("test", |_: &Sample, (v, _s): (i32, Option<String>)| v + 1);
        assert!(matches!(
            resolve(&ty).unwrap_err(),
            ConfigurationError::DuplicateMethod { .. }
        ));

        let mut ty = base();
        ty.declare(Declaration::begin::<(i32, Option<String>)>("begin_test"))
            .declare(Declaration::begin::<(i32, Option<String>)>("begin_test"));
        assert!(matches!(
            resolve(&ty).unwrap_err(),
            ConfigurationError::DuplicateDeclaration { .. }
        ));
    }

    #[test]
    fn begin_without_end_is_allowed() {
        let mut ty = base();
        ty.declare(Declaration::begin::<(i32, Option<String>)>("begin_test").with_callback());
        let table = resolve(&ty).unwrap();
        assert!(table.bindings()[0].ends().is_empty());
    }

    #[test]
    fn error_messages_name_type_and_declaration() {
        let mut ty = base();
        ty.declare(Declaration::end::<i32>("end_test"));
        let message = resolve(&ty).unwrap_err().to_string();
        assert!(message.contains("Sample"));
        assert!(message.contains("end_test(handle)"));
    }
}
