use crate::domain::model::AdaptOptions;
use crate::utils::error::{AdaptError, Result};
use crate::utils::validation::{self, Validate};
use clap::Parser;
use serde_json::Value;

#[derive(Debug, Clone, Parser)]
#[command(name = "duck-adapt")]
#[command(about = "Adapt JSON records to a declared shape")]
pub struct CliConfig {
    #[arg(short, long, help = "TOML file with shapes and default options")]
    pub config: String,

    #[arg(short, long, help = "Name of the shape to adapt to")]
    pub shape: String,

    #[arg(short, long, help = "JSON file with an object or an array of objects")]
    pub input: String,

    #[arg(long, help = "Adapt over a private copy instead of writing through")]
    pub snapshot: bool,

    #[arg(long, help = "Fail when a member has no converter")]
    pub strict: bool,

    #[arg(long, help = "Read unmatched members as defaults")]
    pub lenient: bool,

    #[arg(long = "set", value_name = "MEMBER=VALUE", help = "Assign a member before output")]
    pub assignments: Vec<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliConfig {
    /// 命令列旗標疊加在配置檔的選項之上
    pub fn apply_to(&self, mut options: AdaptOptions) -> AdaptOptions {
        if self.snapshot {
            options.write_through = false;
        }
        if self.strict {
            options.strict_conversion = true;
        }
        if self.lenient {
            options.allow_unmatched_members = true;
        }
        options
    }

    /// 解析 `--set member=value`；值先試著當 JSON 解析，失敗就當字串
    pub fn parsed_assignments(&self) -> Result<Vec<(String, Value)>> {
        self.assignments
            .iter()
            .map(|raw| parse_assignment(raw))
            .collect()
    }
}

fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let Some((member, value)) = raw.split_once('=') else {
        return Err(AdaptError::InvalidConfigValueError {
            field: "set".to_string(),
            value: raw.to_string(),
            reason: "Expected MEMBER=VALUE".to_string(),
        });
    };
    validation::validate_non_empty_string("set", member)?;

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((member.trim().to_string(), value))
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("config", &self.config)?;
        validation::validate_file_extension("config", &self.config, &["toml"])?;
        validation::validate_path("input", &self.input)?;
        validation::validate_file_extension("input", &self.input, &["json"])?;
        validation::validate_non_empty_string("shape", &self.shape)?;
        self.parsed_assignments()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(extra: &[&str]) -> CliConfig {
        let mut argv = vec![
            "duck-adapt",
            "--config",
            "duck.toml",
            "--shape",
            "User",
            "--input",
            "users.json",
        ];
        argv.extend_from_slice(extra);
        CliConfig::parse_from(argv)
    }

    #[test]
    fn test_flags_override_options() {
        let config = args(&["--snapshot", "--strict"]);
        let options = config.apply_to(AdaptOptions::default());
        assert!(!options.write_through);
        assert!(options.strict_conversion);
        assert!(!options.allow_unmatched_members);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_assignments() {
        let config = args(&["--set", "Age=42", "--set", "Name=Ann", "--set", "Tags=[1,2]"]);
        let parsed = config.parsed_assignments().unwrap();
        assert_eq!(parsed[0], ("Age".to_string(), json!(42)));
        assert_eq!(parsed[1], ("Name".to_string(), json!("Ann")));
        assert_eq!(parsed[2], ("Tags".to_string(), json!([1, 2])));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(args(&["--set", "NoEquals"]).validate().is_err());
        assert!(args(&["--set", "=1"]).validate().is_err());

        let wrong_input = CliConfig::parse_from([
            "duck-adapt", "--config", "duck.toml", "--shape", "User", "--input", "users.csv",
        ]);
        assert!(wrong_input.validate().is_err());
    }
}
