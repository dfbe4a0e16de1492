//! Reified descriptions of application value types.
//!
//! Rust erases nothing at runtime that a [`TypeId`] cannot recover, but
//! handler registrations need patterns looser than an exact type: "anything",
//! or "a `Vec` of something". [`BodyType`] covers the three shapes.

use std::any::{TypeId, type_name};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Shape {
    Any,
    Erased,
    Concrete(TypeId),
}

/// Declared type of a body value.
///
/// ```
/// use lintel_core::BodyType;
///
/// let list_of_strings = BodyType::erased::<Vec<String>>().with_arg(BodyType::of::<String>());
/// assert!(BodyType::any().is_assignable_from(&BodyType::of::<u32>()));
/// assert!(BodyType::erased::<Vec<()>>().is_assignable_from(&list_of_strings));
/// assert!(!BodyType::of::<String>().is_assignable_from(&BodyType::of::<u32>()));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BodyType {
    shape: Shape,
    name: &'static str,
    args: Vec<BodyType>,
}

impl BodyType {
    /// Exactly `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            shape: Shape::Concrete(TypeId::of::<T>()),
            name: type_name::<T>(),
            args: Vec::new(),
        }
    }

    /// The type constructor of `T`, ignoring its generic arguments.
    pub fn erased<T: ?Sized + 'static>() -> Self {
        let full = type_name::<T>();
        let name = full.split_once('<').map_or(full, |(raw, _)| raw);
        Self {
            shape: Shape::Erased,
            name,
            args: Vec::new(),
        }
    }

    /// Matches every value.
    pub fn any() -> Self {
        Self {
            shape: Shape::Any,
            name: "*",
            args: Vec::new(),
        }
    }

    /// Declare a type argument on an erased pattern.
    pub fn with_arg(mut self, arg: BodyType) -> Self {
        self.args.push(arg);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn args(&self) -> &[BodyType] {
        &self.args
    }

    pub fn type_id(&self) -> Option<TypeId> {
        match self.shape {
            Shape::Concrete(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_any(&self) -> bool {
        self.shape == Shape::Any
    }

    /// True when the type is exactly `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id() == Some(TypeId::of::<T>())
    }

    /// Whether a value declared as `actual` may be handled by a registration
    /// declared as `self`.
    pub fn is_assignable_from(&self, actual: &BodyType) -> bool {
        match &self.shape {
            Shape::Any => true,
            Shape::Concrete(id) => actual.type_id() == Some(*id),
            Shape::Erased => {
                actual.raw_name() == self.name
                    && (self.args.is_empty()
                        || (self.args.len() == actual.args.len()
                            && self
                                .args
                                .iter()
                                .zip(&actual.args)
                                .all(|(p, a)| p.is_assignable_from(a))))
            }
        }
    }

    /// any < erased < concrete, plus one per declared argument.
    pub fn specificity(&self) -> u32 {
        let base = match self.shape {
            Shape::Any => 0,
            Shape::Erased => 10,
            Shape::Concrete(_) => 20,
        };
        base + self.args.iter().map(|a| 1 + a.specificity()).sum::<u32>()
    }

    fn raw_name(&self) -> &'static str {
        self.name.split_once('<').map_or(self.name, |(raw, _)| raw)
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        if !self.args.is_empty() {
            f.write_str("<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{arg}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BodyType({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concrete_matches_exact_type() {
        let pattern = BodyType::of::<String>();
        assert!(pattern.is_assignable_from(&BodyType::of::<String>()));
        assert!(!pattern.is_assignable_from(&BodyType::of::<&'static str>()));
        assert!(!pattern.is_assignable_from(&BodyType::any()));
    }

    #[test]
    fn test_erased_matches_any_instantiation() {
        let pattern = BodyType::erased::<Vec<u8>>();
        assert!(pattern.is_assignable_from(&BodyType::of::<Vec<String>>()));
        assert!(!pattern.is_assignable_from(&BodyType::of::<Option<u8>>()));
    }

    #[test]
    fn test_erased_with_args() {
        let pattern = BodyType::erased::<Vec<()>>().with_arg(BodyType::of::<String>());
        let strings = BodyType::erased::<Vec<()>>().with_arg(BodyType::of::<String>());
        let numbers = BodyType::erased::<Vec<()>>().with_arg(BodyType::of::<u64>());
        assert!(pattern.is_assignable_from(&strings));
        assert!(!pattern.is_assignable_from(&numbers));
    }

    #[test]
    fn test_specificity_order() {
        let any = BodyType::any().specificity();
        let erased = BodyType::erased::<Vec<u8>>().specificity();
        let erased_arg = BodyType::erased::<Vec<u8>>()
            .with_arg(BodyType::any())
            .specificity();
        let concrete = BodyType::of::<String>().specificity();
        assert!(any < erased);
        assert!(erased < erased_arg);
        assert!(erased_arg < concrete);
    }

    #[test]
    fn test_display() {
        let ty = BodyType::erased::<Vec<u8>>().with_arg(BodyType::of::<String>());
        let rendered = ty.to_string();
        assert!(rendered.ends_with("Vec<alloc::string::String>"), "{rendered}");
        assert_eq!(BodyType::any().to_string(), "*");
    }
}
