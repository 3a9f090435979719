//! Structural verification of signal definitions against the introspection
//! registry.

use tracing::error;

use crate::definition::SignalDefinition;
use crate::error::{SignalError, SignalResult};
use crate::introspection::{IntrospectionMember, IntrospectionRegistry};
use crate::types::PrimitiveType;

/// Verify `definition` and, for structured types, every member recursively.
///
/// The first mismatch aborts verification of the whole subtree.
pub fn verify(definition: &SignalDefinition, registry: &IntrospectionRegistry) -> SignalResult<()> {
    definition.validate()?;

    if PrimitiveType::from_name(&definition.type_name).is_some() {
        if !definition.is_leaf() {
            error!(signal = %definition.name, type_name = %definition.type_name, "Primitive signal with members");
            return Err(SignalError::InvalidDefinition {
                signal: definition.name.clone(),
                reason: format!("primitive type {} cannot have members", definition.type_name),
            });
        }
        return Ok(());
    }

    let Some(class) = registry.find(&definition.type_name) else {
        error!(signal = %definition.name, type_name = %definition.type_name, "Type not registered");
        return Err(SignalError::TypeNotRegistered {
            type_name: definition.type_name.clone(),
        });
    };
    let Some(members) = class.members.as_ref() else {
        error!(signal = %definition.name, type_name = %definition.type_name, "Type not introspectable");
        return Err(SignalError::NotIntrospectable {
            type_name: definition.type_name.clone(),
        });
    };

    let children = definition.children();
    if children.len() != members.len() {
        error!(
            signal = %definition.name,
            type_name = %definition.type_name,
            expected = members.len(),
            found = children.len(),
            "Member count mismatch"
        );
        return Err(SignalError::MemberCountMismatch {
            signal: definition.name.clone(),
            type_name: definition.type_name.clone(),
            expected: members.len(),
            found: children.len(),
        });
    }

    for member in members {
        let Some(child) = definition.find_child(&member.name) else {
            error!(member = %member.name, signal = %definition.name, "Member not found");
            return Err(SignalError::MemberNotFound {
                member: member.name.clone(),
                signal: definition.name.clone(),
                type_name: definition.type_name.clone(),
            });
        };
        verify_member(child, member)?;
        if PrimitiveType::from_name(&child.type_name).is_none() {
            verify(child, registry)?;
        }
    }
    Ok(())
}

fn verify_member(child: &SignalDefinition, member: &IntrospectionMember) -> SignalResult<()> {
    if child.type_name != member.type_name {
        error!(member = %member.name, expected = %member.type_name, found = %child.type_name, "Member type mismatch");
        return Err(SignalError::MemberTypeMismatch {
            member: member.name.clone(),
            expected: member.type_name.clone(),
            found: child.type_name.clone(),
        });
    }

    let shape = child.shape()?;
    let expected = &member.dimensions;
    if shape.count() != expected.count() {
        error!(member = %member.name, expected = expected.count(), found = shape.count(), "Dimension mismatch");
        return Err(SignalError::DimensionMismatch {
            member: member.name.clone(),
            expected: expected.count(),
            found: shape.count(),
        });
    }
    for (dimension, (&found, &want)) in shape
        .elements()
        .iter()
        .zip(expected.elements())
        .enumerate()
    {
        if found != want {
            error!(member = %member.name, dimension, expected = want, found, "Elements mismatch");
            return Err(SignalError::ElementsMismatch {
                member: member.name.clone(),
                dimension,
                expected: want,
                found,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::Dimensions;
    use crate::introspection::ClassInfo;

    fn registry() -> IntrospectionRegistry {
        let mut r = IntrospectionRegistry::new();
        r.register(
            "Inner",
            ClassInfo::introspectable(
                8,
                vec![IntrospectionMember::new("v", "float32", 0, Dimensions::from_elements(&[2]))],
            ),
        );
        r.register(
            "TrackError",
            ClassInfo::introspectable(
                12,
                vec![
                    IntrospectionMember::new("Par1", "uint32", 0, Dimensions::scalar()),
                    IntrospectionMember::new("Par2", "Inner", 4, Dimensions::scalar()),
                ],
            ),
        );
        r.register("Opaque", ClassInfo::opaque(4));
        r
    }

    fn track_error() -> SignalDefinition {
        SignalDefinition::node(
            "Err",
            "TrackError",
            vec![
                SignalDefinition::leaf("Par1", "uint32"),
                SignalDefinition::node(
                    "Par2",
                    "Inner",
                    vec![SignalDefinition::leaf("v", "float32").with_dimensions("[2]")],
                ),
            ],
        )
    }

    #[test]
    fn primitive_leaf_passes() {
        let r = registry();
        assert!(verify(&SignalDefinition::leaf("a", "uint32"), &r).is_ok());
    }

    #[test]
    fn matching_structure_passes() {
        assert!(verify(&track_error(), &registry()).is_ok());
    }

    #[test]
    fn unknown_and_opaque_types_fail() {
        let r = registry();
        assert!(matches!(
            verify(&SignalDefinition::leaf("a", "Missing"), &r),
            Err(SignalError::TypeNotRegistered { .. })
        ));
        assert!(matches!(
            verify(&SignalDefinition::leaf("a", "Opaque"), &r),
            Err(SignalError::NotIntrospectable { .. })
        ));
    }

    #[test]
    fn wrong_member_count_fails() {
        let def = SignalDefinition::node(
            "Err",
            "TrackError",
            vec![SignalDefinition::leaf("Par1", "uint32")],
        );
        assert!(matches!(
            verify(&def, &registry()),
            Err(SignalError::MemberCountMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn wrong_member_name_fails() {
        let mut def = track_error();
        def.children_mut().unwrap()[0].name = "ParX".into();
        assert!(matches!(
            verify(&def, &registry()),
            Err(SignalError::MemberNotFound { .. })
        ));
    }

    #[test]
    fn wrong_member_type_fails() {
        let mut def = track_error();
        def.children_mut().unwrap()[0].type_name = "int32".into();
        assert!(matches!(
            verify(&def, &registry()),
            Err(SignalError::MemberTypeMismatch { .. })
        ));
    }

    #[test]
    fn nested_dimension_mismatch_fails() {
        let mut def = track_error();
        def.children_mut().unwrap()[1].children_mut().unwrap()[0].dimensions = "[3]".into();
        assert!(matches!(
            verify(&def, &registry()),
            Err(SignalError::ElementsMismatch { dimension: 0, expected: 2, found: 3, .. })
        ));

        let mut def = track_error();
        def.children_mut().unwrap()[1].children_mut().unwrap()[0].dimensions = String::new();
        assert!(matches!(
            verify(&def, &registry()),
            Err(SignalError::DimensionMismatch { expected: 1, found: 0, .. })
        ));
    }
}
