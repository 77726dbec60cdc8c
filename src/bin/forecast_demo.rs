use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tscast::core::model::{ArimaModel, ExpSmoothingModel, Forecaster, SmoothingParams};
use tscast::utils::logger;

/// 產生示範用的合成時序：趨勢 + 季節性 + 雜訊
fn generate_sample_data(n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(42);

    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            let trend = 2.0 * t;
            let seasonal = 0.5 * (t * 4.0 * std::f64::consts::PI).sin();
            let noise = rng.gen_range(-0.2..0.2);
            trend + seasonal + noise
        })
        .collect()
}

fn print_metrics(label: &str, metrics: &tscast::core::EvalMetrics) {
    println!("{} evaluation:", label);
    println!("  mae:  {:.4}", metrics.mae);
    println!("  mse:  {:.4}", metrics.mse);
    println!("  rmse: {:.4}", metrics.rmse);
    match metrics.mape {
        Some(mape) => println!("  mape: {:.2}%", mape),
        None => println!("  mape: n/a"),
    }
}

fn main() -> anyhow::Result<()> {
    logger::init_cli_logger(false);

    let y = generate_sample_data(100);

    // 照時間順序切 80/20，不洗牌
    let split = y.len() * 8 / 10;
    let (train, test) = y.split_at(split);

    println!("Fitting ARIMA(2,1,1) on {} observations...", train.len());
    let mut arima = ArimaModel::new(2, 1, 1);
    arima.fit(train)?;
    let arima_metrics = arima.evaluate(test)?;
    print_metrics("ARIMA", &arima_metrics);

    println!();
    println!("Fitting additive Holt-Winters (period 7)...");
    let mut smoothing = ExpSmoothingModel::new(SmoothingParams {
        trend: true,
        seasonal: true,
        seasonal_periods: 7,
        ..SmoothingParams::default()
    });
    smoothing.fit(train)?;
    let smoothing_metrics = smoothing.evaluate(test)?;
    print_metrics("Exponential smoothing", &smoothing_metrics);

    println!();
    let forecast = arima.forecast(5)?;
    println!("ARIMA 5-step forecast beyond the test window:");
    for (step, value) in forecast.iter().enumerate() {
        println!("  t+{}: {:.4}", step + 1, value);
    }

    Ok(())
}
