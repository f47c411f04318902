//! Attribute predicates.

use crate::actor::Actor;
use entigate_model::{Fields, Value};
use serde::Deserialize;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// A field of the resource. Missing fields read as `Null`.
    Resource(String),
    /// An attribute of the actor. Missing attributes read as `Null`.
    Actor(String),
    /// The actor's identifier, as text.
    ActorId,
    /// The actor's organization, as text (`Null` without one).
    ActorOrg,
    /// A constant.
    Literal(Value),
}

impl Operand {
    fn resolve<'a>(&'a self, actor: &'a Actor, resource: Option<&'a Fields>) -> Cow<'a, Value> {
        match self {
            Operand::Resource(field) => resource
                .and_then(|fields| fields.get(field))
                .map_or(Cow::Owned(Value::Null), Cow::Borrowed),
            Operand::Actor(name) => actor
                .attribute(name)
                .map_or(Cow::Owned(Value::Null), Cow::Borrowed),
            Operand::ActorId => Cow::Owned(Value::Text(actor.id().as_str().to_string())),
            Operand::ActorOrg => Cow::Owned(
                actor
                    .org()
                    .map_or(Value::Null, |org| Value::Text(org.as_str().to_string())),
            ),
            Operand::Literal(value) => Cow::Borrowed(value),
        }
    }

    fn references_resource(&self) -> bool {
        matches!(self, Operand::Resource(_))
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Left is an element of the right-hand array.
    In,
}

impl CompareOp {
    fn apply(self, left: &Value, right: &Value) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Lt => left.partial_compare(right) == Some(Ordering::Less),
            CompareOp::Le => matches!(
                left.partial_compare(right),
                Some(Ordering::Less | Ordering::Equal)
            ),
            CompareOp::Gt => left.partial_compare(right) == Some(Ordering::Greater),
            CompareOp::Ge => matches!(
                left.partial_compare(right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CompareOp::In => right
                .as_array()
                .is_some_and(|items| items.contains(left)),
        }
    }
}

type PredicateFn = dyn Fn(&Actor, Option<&Fields>) -> bool + Send + Sync;

/// A named predicate implemented in code.
#[derive(Clone)]
pub struct CustomPredicate {
    name: String,
    needs_resource: bool,
    func: Arc<PredicateFn>,
}

impl CustomPredicate {
    /// Returns the predicate name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("name", &self.name)
            .field("needs_resource", &self.needs_resource)
            .finish_non_exhaustive()
    }
}

/// Boolean condition over the actor's attributes and the resource.
#[derive(Debug, Clone)]
pub enum AttributePredicate {
    /// Compare two operands.
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// Every inner predicate holds (true when empty).
    All(Vec<AttributePredicate>),
    /// At least one inner predicate holds (false when empty).
    Any(Vec<AttributePredicate>),
    /// The inner predicate does not hold.
    Not(Box<AttributePredicate>),
    /// Arbitrary code.
    Custom(CustomPredicate),
}

impl AttributePredicate {
    /// Builds a comparison.
    #[must_use]
    pub fn compare(left: Operand, op: CompareOp, right: Operand) -> Self {
        Self::Compare { left, op, right }
    }

    /// `resource[field] == value`.
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(
            Operand::Resource(field.into()),
            CompareOp::Eq,
            Operand::Literal(value.into()),
        )
    }

    /// `resource[field] == actor.attributes[attribute]`.
    pub fn field_matches_attribute(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::compare(
            Operand::Resource(field.into()),
            CompareOp::Eq,
            Operand::Actor(attribute.into()),
        )
    }

    /// Wraps a closure as a named predicate.
    ///
    /// `needs_resource` tells the engine to defer evaluation when no
    /// resource is available yet.
    pub fn custom<F>(name: impl Into<String>, needs_resource: bool, func: F) -> Self
    where
        F: Fn(&Actor, Option<&Fields>) -> bool + Send + Sync + 'static,
    {
        Self::Custom(CustomPredicate {
            name: name.into(),
            needs_resource,
            func: Arc::new(func),
        })
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn evaluate(&self, actor: &Actor, resource: Option<&Fields>) -> bool {
        match self {
            Self::Compare { left, op, right } => {
                let left = left.resolve(actor, resource);
                let right = right.resolve(actor, resource);
                op.apply(&left, &right)
            }
            Self::All(inner) => inner.iter().all(|p| p.evaluate(actor, resource)),
            Self::Any(inner) => inner.iter().any(|p| p.evaluate(actor, resource)),
            Self::Not(inner) => !inner.evaluate(actor, resource),
            Self::Custom(custom) => (custom.func)(actor, resource),
        }
    }

    /// Returns true if evaluation reads the resource.
    #[must_use]
    pub fn references_resource(&self) -> bool {
        match self {
            Self::Compare { left, right, .. } => {
                left.references_resource() || right.references_resource()
            }
            Self::All(inner) | Self::Any(inner) => inner.iter().any(Self::references_resource),
            Self::Not(inner) => inner.references_resource(),
            Self::Custom(custom) => custom.needs_resource,
        }
    }

    /// Returns every resource field named by the predicate.
    #[must_use]
    pub fn resource_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Resource(field) = operand {
                        out.push(field);
                    }
                }
            }
            Self::All(inner) | Self::Any(inner) => {
                for p in inner {
                    p.collect_fields(out);
                }
            }
            Self::Not(inner) => inner.collect_fields(out),
            Self::Custom(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;

    fn resource(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn field_equals_literal() {
        let actor = Actor::new("A", Role::User);
        let draft = resource(&[("status", Value::from("draft"))]);
        let published = resource(&[("status", Value::from("published"))]);

        let predicate = AttributePredicate::field_equals("status", "draft");
        assert!(predicate.evaluate(&actor, Some(&draft)));
        assert!(!predicate.evaluate(&actor, Some(&published)));
    }

    #[test]
    fn missing_field_reads_as_null() {
        let actor = Actor::new("A", Role::User);
        let predicate = AttributePredicate::compare(
            Operand::Resource("deletedAt".into()),
            CompareOp::Eq,
            Operand::Literal(Value::Null),
        );
        assert!(predicate.evaluate(&actor, Some(&Fields::new())));
    }

    #[test]
    fn ordering_against_actor_attribute() {
        let actor = Actor::new("A", Role::User).with_attribute("clearance", 2i64);
        let predicate = AttributePredicate::compare(
            Operand::Resource("level".into()),
            CompareOp::Le,
            Operand::Actor("clearance".into()),
        );

        assert!(predicate.evaluate(&actor, Some(&resource(&[("level", Value::Integer(2))]))));
        assert!(!predicate.evaluate(&actor, Some(&resource(&[("level", Value::Integer(3))]))));
        // Incomparable kinds never satisfy an ordering.
        assert!(!predicate.evaluate(&actor, Some(&resource(&[("level", Value::from("2"))]))));
    }

    #[test]
    fn membership_and_combinators() {
        let actor = Actor::new("A", Role::User).with_org("acme");
        let predicate = AttributePredicate::All(vec![
            AttributePredicate::compare(
                Operand::Resource("status".into()),
                CompareOp::In,
                Operand::Literal(Value::Array(vec![
                    Value::from("draft"),
                    Value::from("review"),
                ])),
            ),
            AttributePredicate::Not(Box::new(AttributePredicate::compare(
                Operand::ActorOrg,
                CompareOp::Eq,
                Operand::Literal(Value::from("blocked")),
            ))),
        ]);

        assert!(predicate.evaluate(&actor, Some(&resource(&[("status", Value::from("review"))]))));
        assert!(!predicate.evaluate(&actor, Some(&resource(&[("status", Value::from("live"))]))));
        assert!(AttributePredicate::All(vec![]).evaluate(&actor, None));
        assert!(!AttributePredicate::Any(vec![]).evaluate(&actor, None));
    }

    #[test]
    fn resource_references_are_tracked() {
        let actor_only = AttributePredicate::compare(
            Operand::Actor("tier".into()),
            CompareOp::Eq,
            Operand::Literal(Value::from("gold")),
        );
        assert!(!actor_only.references_resource());

        let mixed = AttributePredicate::Any(vec![
            actor_only,
            AttributePredicate::field_matches_attribute("region", "region"),
        ]);
        assert!(mixed.references_resource());
        assert_eq!(mixed.resource_fields(), vec!["region"]);
    }

    #[test]
    fn custom_predicate_runs_closure() {
        let predicate = AttributePredicate::custom("even-id", false, |actor, _| {
            actor.id().as_str().len() % 2 == 0
        });
        assert!(predicate.evaluate(&Actor::new("ab", Role::User), None));
        assert!(!predicate.evaluate(&Actor::new("abc", Role::User), None));
        assert!(!predicate.references_resource());
    }
}
