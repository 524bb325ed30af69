use crate::domain::model::ValueType;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdaptError {
    #[error("Shape '{shape}' is not adaptable: {reason}")]
    ShapeDescriptorInvalid { shape: String, reason: String },

    #[error("Member '{member}' of shape '{shape}' has no backing key")]
    MemberUnbound { shape: String, member: String },

    #[error("No converter from {from} to {to} for member '{member}' of shape '{shape}'")]
    ConversionFailed {
        shape: String,
        member: String,
        from: ValueType,
        to: ValueType,
    },

    #[error("Blueprint generation failed for {signature}: {message}")]
    CacheGenerationFailed { signature: String, message: String },

    #[error("Member '{member}' of shape '{shape}' is read-only")]
    ReadOnlyMember { shape: String, member: String },

    #[error("Shape '{shape}' has no member '{member}'")]
    UnknownMember { shape: String, member: String },

    #[error("Backing source rejected write to '{member}': {reason}")]
    WriteRejected { member: String, reason: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// 快取需要把同一個失敗交給所有等待者，所以錯誤必須能 Clone；
// 底層 IO / serde 錯誤只保留訊息。
impl From<std::io::Error> for AdaptError {
    fn from(e: std::io::Error) -> Self {
        AdaptError::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for AdaptError {
    fn from(e: serde_json::Error) -> Self {
        AdaptError::SerializationError(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Shape,
    Binding,
    Conversion,
    Cache,
    Access,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AdaptError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AdaptError::ShapeDescriptorInvalid { .. } => ErrorCategory::Shape,
            AdaptError::MemberUnbound { .. } => ErrorCategory::Binding,
            AdaptError::ConversionFailed { .. } => ErrorCategory::Conversion,
            AdaptError::CacheGenerationFailed { .. } => ErrorCategory::Cache,
            AdaptError::ReadOnlyMember { .. }
            | AdaptError::UnknownMember { .. }
            | AdaptError::WriteRejected { .. } => ErrorCategory::Access,
            AdaptError::ConfigError { .. }
            | AdaptError::ConfigValidationError { .. }
            | AdaptError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            AdaptError::IoError(_) | AdaptError::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Access => ErrorSeverity::Low,
            // 快取失敗不會污染條目，下次 adapt 會重新生成
            ErrorCategory::Cache => ErrorSeverity::Medium,
            ErrorCategory::Shape
            | ErrorCategory::Binding
            | ErrorCategory::Conversion
            | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 是否值得直接重試同一個呼叫
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdaptError::CacheGenerationFailed { .. })
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            AdaptError::ShapeDescriptorInvalid { .. } => {
                "Fix the shape definition: members must be properties, nested shapes or collections".to_string()
            }
            AdaptError::MemberUnbound { member, .. } => format!(
                "Add a key matching '{}' to the source, or enable allow_unmatched_members",
                member
            ),
            AdaptError::ConversionFailed { from, to, .. } => format!(
                "Register a converter for {} -> {}, or disable strict_conversion",
                from, to
            ),
            AdaptError::CacheGenerationFailed { .. } => "Retry the adaptation".to_string(),
            AdaptError::ReadOnlyMember { .. } => {
                "Declare the member as read_write in the shape".to_string()
            }
            AdaptError::UnknownMember { shape, .. } => {
                format!("Check the member names declared by shape '{}'", shape)
            }
            AdaptError::WriteRejected { .. } => {
                "Check that the backing source accepts this key".to_string()
            }
            AdaptError::ConfigError { .. }
            | AdaptError::ConfigValidationError { .. }
            | AdaptError::InvalidConfigValueError { .. } => {
                "Check the configuration file".to_string()
            }
            AdaptError::IoError(_) => "Check that the file exists and is readable".to_string(),
            AdaptError::SerializationError(_) => "Check that the input is valid JSON".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Shape => format!("Shape definition problem: {}", self),
            ErrorCategory::Binding => format!("Missing data: {}", self),
            ErrorCategory::Conversion => format!("Type mismatch: {}", self),
            ErrorCategory::Cache => format!("Temporary failure: {}", self),
            ErrorCategory::Access => format!("Access denied: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdaptError>;
