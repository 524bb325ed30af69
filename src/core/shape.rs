use crate::domain::model::{Access, MemberKind, MemberSpec, ShapeSpec, ValueType};
use crate::utils::error::{AdaptError, Result};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberTag {
    Scalar,
    Nested(Arc<ShapeDescriptor>),
    Collection(Arc<ShapeDescriptor>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberDescriptor {
    pub name: String,
    pub value_type: ValueType,
    pub access: Access,
    pub tag: MemberTag,
}

impl MemberDescriptor {
    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }

    /// 未綁定且寬鬆模式下讀取時回傳的值
    pub fn default_value(&self) -> serde_json::Value {
        self.value_type.default_value()
    }
}

/// 不可變的 shape 描述，建立後不再修改
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeDescriptor {
    name: String,
    members: Vec<MemberDescriptor>,
}

impl ShapeDescriptor {
    /// 由 shape 規格建立描述；純函式，相同規格得到相等的描述
    pub fn build(spec: &ShapeSpec) -> Result<Arc<Self>> {
        build_descriptor(spec, &spec.name).map(Arc::new)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    /// 依名稱找成員：先精確比對，再不分大小寫
    pub fn find(&self, name: &str) -> Option<(usize, &MemberDescriptor)> {
        self.members
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
            .or_else(|| {
                self.members
                    .iter()
                    .enumerate()
                    .find(|(_, m)| m.name.eq_ignore_ascii_case(name))
            })
    }
}

impl fmt::Display for ShapeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match &member.tag {
                MemberTag::Scalar => write!(f, "{}:{}", member.name, member.value_type)?,
                MemberTag::Nested(inner) => write!(f, "{}:{}", member.name, inner)?,
                MemberTag::Collection(inner) => write!(f, "{}:[{}]", member.name, inner)?,
            }
        }
        write!(f, ")")
    }
}

fn invalid(path: &str, reason: String) -> AdaptError {
    AdaptError::ShapeDescriptorInvalid {
        shape: path.to_string(),
        reason,
    }
}

fn build_descriptor(spec: &ShapeSpec, path: &str) -> Result<ShapeDescriptor> {
    if spec.name.trim().is_empty() {
        return Err(invalid(path, "shape name cannot be empty".to_string()));
    }

    let mut seen = HashSet::new();
    let mut members = Vec::with_capacity(spec.members.len());

    for member in &spec.members {
        if member.name.trim().is_empty() {
            return Err(invalid(path, "member name cannot be empty".to_string()));
        }
        if !seen.insert(member.name.to_lowercase()) {
            return Err(invalid(
                path,
                format!("duplicate member '{}'", member.name),
            ));
        }
        members.push(build_member(member, path)?);
    }

    Ok(ShapeDescriptor {
        name: spec.name.clone(),
        members,
    })
}

fn build_member(member: &MemberSpec, path: &str) -> Result<MemberDescriptor> {
    let inner = |shape: &Option<Box<ShapeSpec>>| -> Result<Arc<ShapeDescriptor>> {
        let shape = shape.as_ref().ok_or_else(|| {
            invalid(
                path,
                format!("member '{}' requires an inner shape", member.name),
            )
        })?;
        let inner_path = format!("{}.{}", path, member.name);
        build_descriptor(shape, &inner_path).map(Arc::new)
    };

    let (tag, value_type) = match member.kind {
        MemberKind::Property => {
            if member.shape.is_some() {
                return Err(invalid(
                    path,
                    format!(
                        "property '{}' cannot declare an inner shape; use kind = \"nested\"",
                        member.name
                    ),
                ));
            }
            (MemberTag::Scalar, member.value_type)
        }
        MemberKind::Nested => (MemberTag::Nested(inner(&member.shape)?), ValueType::Object),
        MemberKind::Collection => (
            MemberTag::Collection(inner(&member.shape)?),
            ValueType::Array,
        ),
        MemberKind::Method => {
            return Err(invalid(
                path,
                format!(
                    "member '{}' is a method; only accessors, nested shapes and collections can be adapted",
                    member.name
                ),
            ));
        }
    };

    // 集合成員只能唯讀：元素各自透過自己的 adapter 寫回
    let access = match member.kind {
        MemberKind::Collection => Access::ReadOnly,
        _ => member.access,
    };

    Ok(MemberDescriptor {
        name: member.name.clone(),
        value_type,
        access,
        tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_spec() -> ShapeSpec {
        ShapeSpec::new("User")
            .read_write("Name", ValueType::String)
            .read_only("Id", ValueType::Integer)
            .nested(
                "Address",
                ShapeSpec::new("Address").read_write("City", ValueType::String),
            )
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = ShapeDescriptor::build(&user_spec()).unwrap();
        let b = ShapeDescriptor::build(&user_spec()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.members().len(), 3);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_find_member_case_insensitive() {
        let shape = ShapeDescriptor::build(&user_spec()).unwrap();
        let (idx, member) = shape.find("name").unwrap();
        assert_eq!(idx, 0);
        assert_eq!(member.name, "Name");
        assert!(shape.find("Missing").is_none());
    }

    #[test]
    fn test_method_member_is_rejected() {
        let spec = ShapeSpec::new("Greeter").method("SayHello");
        let err = ShapeDescriptor::build(&spec).unwrap_err();
        assert!(matches!(err, AdaptError::ShapeDescriptorInvalid { .. }));
    }

    #[test]
    fn test_nested_method_reports_path() {
        let spec = ShapeSpec::new("Outer").nested("Inner", ShapeSpec::new("Inner").method("Run"));
        match ShapeDescriptor::build(&spec).unwrap_err() {
            AdaptError::ShapeDescriptorInvalid { shape, .. } => assert_eq!(shape, "Outer.Inner"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_member_is_rejected() {
        let spec = ShapeSpec::new("Dup")
            .read_write("Name", ValueType::String)
            .read_only("NAME", ValueType::String);
        assert!(ShapeDescriptor::build(&spec).is_err());
    }

    #[test]
    fn test_nested_without_inner_shape_is_rejected() {
        let mut spec = ShapeSpec::new("Broken");
        spec.members.push(MemberSpec {
            name: "Child".to_string(),
            kind: MemberKind::Nested,
            value_type: ValueType::Object,
            access: Access::ReadWrite,
            shape: None,
        });
        assert!(ShapeDescriptor::build(&spec).is_err());
    }

    #[test]
    fn test_collection_is_read_only() {
        let spec = ShapeSpec::new("Order").member(MemberSpec {
            name: "Lines".to_string(),
            kind: MemberKind::Collection,
            value_type: ValueType::Array,
            access: Access::ReadWrite,
            shape: Some(Box::new(ShapeSpec::new("Line").read_write("Sku", ValueType::String))),
        });
        let shape = ShapeDescriptor::build(&spec).unwrap();
        assert!(!shape.members()[0].is_writable());
    }
}
