use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use crate::utils::timer::Stopwatch;

/// 依序執行四個階段並記錄進度
pub struct ForecastEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> ForecastEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(false),
        }
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("Starting forecast pipeline");

        let watch = Stopwatch::start("Extract stage");
        let frame = self.pipeline.extract().await?;
        tracing::info!("Extracted {} observations", frame.len());
        self.monitor.log_stats("Extract");
        watch.finish();

        let watch = Stopwatch::start("Transform stage");
        let features = self.pipeline.transform(frame).await?;
        tracing::info!(
            "Built {} feature rows ({} columns)",
            features.len(),
            features.names.len()
        );
        self.monitor.log_stats("Transform");
        watch.finish();

        let watch = Stopwatch::start("Evaluate stage");
        let validation = self.pipeline.evaluate(&features).await?;
        tracing::info!(
            "Cross-validation over {} folds: mean MAE={:.4}, mean RMSE={:.4}",
            validation.folds.len(),
            validation.mean_mae,
            validation.mean_rmse
        );
        self.monitor.log_stats("Evaluate");
        watch.finish();

        let watch = Stopwatch::start("Load stage");
        let output_path = self.pipeline.load(features, validation).await?;
        tracing::info!("Report saved to: {}", output_path);
        self.monitor.log_stats("Load");
        watch.finish();

        self.monitor.log_final_stats();
        Ok(output_path)
    }
}
