use crate::core::shape::ShapeDescriptor;
use crate::domain::model::{AdaptOptions, ShapeSpec};
use crate::utils::error::{AdaptError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuckConfig {
    #[serde(default)]
    pub options: AdaptOptions,
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub shapes: Vec<ShapeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub json: Option<bool>,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl DuckConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| AdaptError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SHAPE_NAME})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AdaptError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 依名稱找 shape（不分大小寫）
    pub fn shape(&self, name: &str) -> Option<&ShapeSpec> {
        self.shapes
            .iter()
            .find(|s| s.name == name)
            .or_else(|| self.shapes.iter().find(|s| s.name.eq_ignore_ascii_case(name)))
    }

    pub fn shape_names(&self) -> Vec<&str> {
        self.shapes.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or("info")
    }

    pub fn json_logging(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        if let Some(level) = self.logging.as_ref().and_then(|l| l.level.as_deref()) {
            validation::validate_one_of("logging.level", level, &LOG_LEVELS)?;
        }

        let mut seen = std::collections::HashSet::new();
        for shape in &self.shapes {
            validation::validate_non_empty_string("shapes.name", &shape.name)?;
            if !seen.insert(shape.name.to_lowercase()) {
                return Err(AdaptError::ConfigValidationError {
                    field: "shapes".to_string(),
                    message: format!("Shape '{}' is defined more than once", shape.name),
                });
            }
            // 每個 shape 都必須能建立描述
            ShapeDescriptor::build(shape)?;
        }

        Ok(())
    }
}

impl Validate for DuckConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{MemberKind, ValueType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[options]
write_through = false
strict_conversion = true

[logging]
level = "debug"

[[shapes]]
name = "User"

[[shapes.members]]
name = "UserName"
type = "string"

[[shapes.members]]
name = "Age"
type = "integer"
access = "read_only"

[[shapes.members]]
name = "Address"
kind = "nested"

[shapes.members.shape]
name = "Address"

[[shapes.members.shape.members]]
name = "City"
type = "string"
"#;

    #[test]
    fn test_parse_basic_config() {
        let config = DuckConfig::from_toml_str(BASIC).unwrap();

        assert!(!config.options.write_through);
        assert!(config.options.strict_conversion);
        assert!(!config.options.allow_unmatched_members);
        assert_eq!(config.log_level(), "debug");

        let user = config.shape("user").unwrap();
        assert_eq!(user.members.len(), 3);
        assert_eq!(user.members[1].value_type, ValueType::Integer);
        assert_eq!(user.members[2].kind, MemberKind::Nested);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = DuckConfig::from_toml_str("").unwrap();
        assert_eq!(config.options, AdaptOptions::default());
        assert!(config.shapes.is_empty());
        assert_eq!(config.log_level(), "info");
        assert!(!config.json_logging());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("DUCK_TEST_SHAPE_NAME", "Customer");

        let toml_content = r#"
[[shapes]]
name = "${DUCK_TEST_SHAPE_NAME}"
"#;

        let config = DuckConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.shape_names(), vec!["Customer"]);

        std::env::remove_var("DUCK_TEST_SHAPE_NAME");
    }

    #[test]
    fn test_config_validation() {
        let bad_level = DuckConfig::from_toml_str("[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(bad_level.validate().is_err());

        let method = r#"
[[shapes]]
name = "Greeter"

[[shapes.members]]
name = "SayHello"
kind = "method"
"#;
        let config = DuckConfig::from_toml_str(method).unwrap();
        assert!(matches!(
            config.validate(),
            Err(AdaptError::ShapeDescriptorInvalid { .. })
        ));

        let duplicate = "[[shapes]]\nname = \"A\"\n[[shapes]]\nname = \"a\"\n";
        let config = DuckConfig::from_toml_str(duplicate).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = DuckConfig::from_toml_str("[options\n").unwrap_err();
        assert!(matches!(err, AdaptError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = DuckConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.shape_names(), vec!["User"]);
    }
}
