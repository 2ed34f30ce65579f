//! Declaration-time annotations.
//!
//! Annotations are plain data attached to stub methods and properties. They
//! name a member by owner type (either a registered [`TypeId`] or a full type
//! name with an optional module hint) and member name.

use crate::model::TypeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSelector {
    Id(TypeId),
    Named {
        full_name: String,
        module: Option<String>,
    },
}

/// Owner type plus member name, as written on the declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSelector {
    pub owner: TypeSelector,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// The member calls to this stub are redirected to.
    ForwardTarget(MemberSelector),
    /// Static storage supplying the receiver instead of a first parameter.
    ReceiverSource(MemberSelector),
    /// Trace the generated routine while it is built.
    Debug,
}

impl Annotation {
    pub fn forward_to(owner: TypeId, name: impl Into<String>) -> Self {
        Annotation::ForwardTarget(MemberSelector {
            owner: TypeSelector::Id(owner),
            name: name.into(),
        })
    }

    pub fn forward_to_named(
        full_name: impl Into<String>,
        module: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Annotation::ForwardTarget(MemberSelector {
            owner: TypeSelector::Named {
                full_name: full_name.into(),
                module: module.map(str::to_string),
            },
            name: name.into(),
        })
    }

    pub fn receiver_from(owner: TypeId, name: impl Into<String>) -> Self {
        Annotation::ReceiverSource(MemberSelector {
            owner: TypeSelector::Id(owner),
            name: name.into(),
        })
    }

    pub fn receiver_from_named(
        full_name: impl Into<String>,
        module: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Annotation::ReceiverSource(MemberSelector {
            owner: TypeSelector::Named {
                full_name: full_name.into(),
                module: module.map(str::to_string),
            },
            name: name.into(),
        })
    }
}

/// Queries over the annotations of one declaration.
///
/// A declaration has at most one forward target; when several are attached
/// the first one wins.
pub trait AnnotationSet {
    fn forward_target(&self) -> Option<&MemberSelector>;
    fn receiver_source(&self) -> Option<&MemberSelector>;
    fn has_debug(&self) -> bool;
}

impl AnnotationSet for [Annotation] {
    fn forward_target(&self) -> Option<&MemberSelector> {
        self.iter().find_map(|a| match a {
            Annotation::ForwardTarget(sel) => Some(sel),
            _ => None,
        })
    }

    fn receiver_source(&self) -> Option<&MemberSelector> {
        self.iter().find_map(|a| match a {
            Annotation::ReceiverSource(sel) => Some(sel),
            _ => None,
        })
    }

    fn has_debug(&self) -> bool {
        self.iter().any(|a| matches!(a, Annotation::Debug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_forward_target_wins() {
        let list = vec![
            Annotation::Debug,
            Annotation::forward_to(TypeId(9), "First"),
            Annotation::forward_to(TypeId(9), "Second"),
        ];
        assert_eq!(list.forward_target().map(|s| s.name.as_str()), Some("First"));
        assert!(list.receiver_source().is_none());
        assert!(list.has_debug());
    }

    #[test]
    fn test_named_selector_keeps_module_hint() {
        let a = Annotation::receiver_from_named("Demo.Program", Some("Demo"), "Instance");
        let list = [a];
        let sel = list.receiver_source().unwrap();
        assert_eq!(
            sel.owner,
            TypeSelector::Named {
                full_name: "Demo.Program".into(),
                module: Some("Demo".into())
            }
        );
    }
}
