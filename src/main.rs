use anyhow::Context;
use clap::Parser;
use duck_adapt::utils::error::{AdaptError, ErrorSeverity};
use duck_adapt::utils::{logger, validation::Validate};
use duck_adapt::{CliConfig, DuckConfig, DuckEngine, MapSource};
use serde_json::Value;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    let duck_config = DuckConfig::from_file(&config.config);

    // 初始化日誌：配置檔要求 JSON 時改用 JSON 格式
    match &duck_config {
        Ok(c) if c.json_logging() && !config.verbose => logger::init_json_logger(c.log_level()),
        Ok(c) => logger::init_cli_logger(config.verbose, c.log_level()),
        Err(_) => logger::init_cli_logger(config.verbose, "info"),
    }

    tracing::info!("Starting duck-adapt CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    match duck_config.and_then(|c| run(&config, &c)) {
        Ok(output) => {
            let rendered =
                serde_json::to_string_pretty(&output).context("failed to render output")?;
            println!("{}", rendered);
            tracing::info!("✅ Adaptation completed successfully!");
        }
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ Adaptation failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            // 輸出用戶友好的錯誤信息
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼；沒有輸出的執行一律非零
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 4,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

fn run(config: &CliConfig, duck_config: &DuckConfig) -> Result<Value, AdaptError> {
    duck_config.validate()?;

    let shape = duck_config
        .shape(&config.shape)
        .ok_or_else(|| AdaptError::ConfigValidationError {
            field: "shape".to_string(),
            message: format!(
                "Shape '{}' not found (available: {})",
                config.shape,
                duck_config.shape_names().join(", ")
            ),
        })?;
    let options = config.apply_to(duck_config.options);
    let assignments = config.parsed_assignments()?;

    let input: Value = serde_json::from_str(&std::fs::read_to_string(&config.input)?)?;
    let (records, single) = match input {
        Value::Array(items) => (items, false),
        other => (vec![other], true),
    };
    tracing::info!("📥 Loaded {} record(s) from {}", records.len(), config.input);

    let engine = DuckEngine::new();
    let mut output = Vec::with_capacity(records.len());
    for record in records {
        let source = Arc::new(MapSource::from_value(record)?);
        let adapter = engine.adapt(source, shape, options)?;
        for (member, value) in &assignments {
            adapter.set(member, value.clone())?;
        }
        output.push(adapter.to_value()?);
    }

    let stats = engine.cache_stats();
    tracing::debug!(
        "📊 Cache: {} hits, {} misses, {} generations",
        stats.hits,
        stats.misses,
        stats.generations
    );

    Ok(if single {
        output.pop().unwrap_or(Value::Null)
    } else {
        Value::Array(output)
    })
}
