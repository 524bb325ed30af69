use crate::core::converter::{Conversion, ConverterRegistry, Resolution};
use crate::core::shape::{MemberDescriptor, ShapeDescriptor};
use crate::domain::model::ValueType;
use crate::domain::ports::SourceSignature;
use crate::utils::error::{AdaptError, Result};
use std::fmt;
use std::sync::Arc;

/// 成員讀寫時要套用的轉換
#[derive(Debug, Clone)]
pub enum BoundConversion {
    Identity,
    Convert(Conversion),
    /// 型別不同且沒有轉換器：非嚴格模式下原值直接傳遞
    PassThrough { from: ValueType, to: ValueType },
    /// 綁定時後端值為 null，型別未知；每次存取時依當下的值解析轉換器
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Normalized,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub member: MemberDescriptor,
    /// None 代表未綁定
    pub key: Option<String>,
    pub match_kind: Option<MatchKind>,
    pub conversion: BoundConversion,
}

impl Binding {
    pub fn is_bound(&self) -> bool {
        self.key.is_some()
    }
}

/// (shape, 來源簽章) 的綁定結果；建立後不可變
#[derive(Debug)]
pub struct Blueprint {
    shape: Arc<ShapeDescriptor>,
    source: SourceSignature,
    bindings: Vec<Binding>,
}

impl Blueprint {
    pub fn shape(&self) -> &Arc<ShapeDescriptor> {
        &self.shape
    }

    pub fn source(&self) -> &SourceSignature {
        &self.source
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn binding(&self, member: &str) -> Option<&Binding> {
        self.shape.find(member).map(|(idx, _)| &self.bindings[idx])
    }

    /// 嚴格模式：任何找不到轉換器的型別差異都在綁定時失敗
    pub fn ensure_strict(&self) -> Result<()> {
        for binding in &self.bindings {
            if let BoundConversion::PassThrough { from, to } = binding.conversion {
                return Err(AdaptError::ConversionFailed {
                    shape: self.shape.name().to_string(),
                    member: binding.member.name.clone(),
                    from,
                    to,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.shape.name(), self.source)
    }
}

/// 去掉分隔字元（`_`、`-`、空白）並轉小寫
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !(*c == '_' || *c == '-' || c.is_whitespace()))
        .flat_map(char::to_lowercase)
        .collect()
}

/// 為每個 shape 成員找出對應的後端 key 與轉換器
pub struct PropertyBinder<'a> {
    registry: &'a ConverterRegistry,
}

impl<'a> PropertyBinder<'a> {
    pub fn new(registry: &'a ConverterRegistry) -> Self {
        Self { registry }
    }

    /// 純函式：只依賴 shape 與來源簽章，不看來源實際的值
    pub fn bind(&self, shape: &Arc<ShapeDescriptor>, source: &SourceSignature) -> Blueprint {
        let bindings = shape
            .members()
            .iter()
            .map(|member| self.bind_member(shape, member, source))
            .collect();

        Blueprint {
            shape: Arc::clone(shape),
            source: source.clone(),
            bindings,
        }
    }

    fn bind_member(
        &self,
        shape: &ShapeDescriptor,
        member: &MemberDescriptor,
        source: &SourceSignature,
    ) -> Binding {
        let Some((key, backing_type, match_kind)) = find_key(&member.name, source) else {
            tracing::trace!("{}.{} is unbound against {}", shape.name(), member.name, source);
            return Binding {
                member: member.clone(),
                key: None,
                match_kind: None,
                conversion: BoundConversion::Identity,
            };
        };

        let conversion = match self.registry.resolve(backing_type, member.value_type) {
            _ if backing_type == ValueType::Null
                && !matches!(member.value_type, ValueType::Any | ValueType::Null) =>
            {
                BoundConversion::Deferred
            }
            Some(Resolution::Identity) => BoundConversion::Identity,
            Some(Resolution::Convert(conversion)) => BoundConversion::Convert(conversion),
            None => BoundConversion::PassThrough {
                from: backing_type,
                to: member.value_type,
            },
        };

        tracing::trace!(
            "{}.{} -> '{}' ({:?}, {:?})",
            shape.name(),
            member.name,
            key,
            match_kind,
            conversion
        );

        Binding {
            member: member.clone(),
            key: Some(key),
            match_kind: Some(match_kind),
            conversion,
        }
    }
}

/// 先不分大小寫精確比對，再比對正規化後的 key；同名時取宣告順序的第一個
fn find_key(name: &str, source: &SourceSignature) -> Option<(String, ValueType, MatchKind)> {
    let lowered = name.to_lowercase();
    if let Some((key, t)) = source.fields.iter().find(|(k, _)| k.to_lowercase() == lowered) {
        return Some((key.clone(), *t, MatchKind::Exact));
    }

    let normalized = normalize_key(name);
    source
        .fields
        .iter()
        .find(|(k, _)| normalize_key(k) == normalized)
        .map(|(key, t)| (key.clone(), *t, MatchKind::Normalized))
}
