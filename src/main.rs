use clap::Parser;
use tscast::adapters::mysql::MySqlSeriesSource;
use tscast::config::toml_config::TomlConfig;
use tscast::utils::{logger, validation::Validate};
use tscast::{ForecastEngine, ForecastPipeline, LocalStorage};

#[derive(Parser)]
#[command(name = "tscast")]
#[command(about = "Time-series forecasting pipeline: MySQL -> features -> model -> report")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "tscast.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);

    tracing::info!("🚀 Starting tscast forecasting pipeline");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    // 載入 TOML 配置
    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No database connection will be made");
        perform_dry_run(&config)?;
        return Ok(());
    }

    // 決定監控設定
    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    // 建立資料來源、存儲與管線
    let query = match config.series_query() {
        Ok(query) => query,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };
    let source = match MySqlSeriesSource::connect(&config.database.url, query).await {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("❌ Database connection failed: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(2);
        }
    };
    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = ForecastPipeline::new(source, storage, config);

    // 建立引擎並執行
    let engine = ForecastEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Forecast pipeline completed successfully!");
            tracing::info!("📁 Report saved to: {}", output_path);
            println!("✅ Forecast pipeline completed successfully!");
            println!("📁 Report saved to: {}", output_path);
        }
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ Forecast pipeline failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                tscast::utils::error::ErrorSeverity::Low => 0,
                tscast::utils::error::ErrorSeverity::Medium => 2,
                tscast::utils::error::ErrorSeverity::High => 1,
                tscast::utils::error::ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name, config.pipeline.version
    );
    println!(
        "  Source: {} (table `{}`)",
        config.database.url, config.database.table
    );
    println!("  Output: {}", config.output_path());
    println!("  Model: {}", config.model.kind);
    println!("  Horizon: {} steps", config.horizon());
    println!("  Formats: {}", config.report.output_formats.join(", "));
    println!("  CV folds: {}", config.n_splits());

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &TomlConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📡 Data Source Analysis:");
    let query = config.series_query()?;
    let (sql, binds) = query.to_sql();
    println!("  SQL: {}", sql);
    if !binds.is_empty() {
        println!("  Binds: {}", binds.join(", "));
    }

    println!();
    println!("⚙️ Feature Engineering:");
    println!("  Window size: {}", config.window_size());
    println!("  Lag steps: {}", config.lag_steps());
    println!("  Normalize: {}", config.normalize());

    println!();
    println!("📈 Model:");
    let spec = config.model_spec()?;
    println!("  Kind: {}", spec.name());
    println!("  Forecast horizon: {} steps", config.horizon());
    println!("  Validation folds: {}", config.n_splits());

    println!();
    println!("💾 Output Configuration:");
    println!("  Path: {}", config.output_path());
    println!("  Formats: {}", config.report.output_formats.join(", "));
    if config.bundle_enabled() {
        println!("  Bundle: {} (ZIP)", config.bundle_filename());
    }
    if let Some(excel) = config.excel_report() {
        println!(
            "  Excel template: {} (sheet '{}', {} mapped columns)",
            excel.template,
            excel.sheet,
            excel.column_mapping.len()
        );
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");

    Ok(())
}
