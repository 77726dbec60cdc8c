use crate::core::features::Scaler;
use crate::domain::model::EvalMetrics;
use crate::utils::error::{PipelineError, Result};

/// 預測模型共同介面；fit 可重複呼叫（交叉驗證每個 fold 會重新訓練）
pub trait Forecaster: Send {
    fn name(&self) -> &'static str;

    fn fit(&mut self, y: &[f64]) -> Result<()>;

    fn forecast(&self, steps: usize) -> Result<Vec<f64>>;

    fn evaluate(&self, actual: &[f64]) -> Result<EvalMetrics> {
        let predicted = self.forecast(actual.len())?;
        Ok(EvalMetrics::between(actual, &predicted))
    }
}

/// 設定檔選定的模型與參數
#[derive(Debug, Clone)]
pub enum ModelSpec {
    Arima {
        p: usize,
        d: usize,
        q: usize,
    },
    ExpSmoothing(SmoothingParams),
}

impl ModelSpec {
    pub fn build(&self) -> Box<dyn Forecaster> {
        match self {
            ModelSpec::Arima { p, d, q } => Box::new(ArimaModel::new(*p, *d, *q)),
            ModelSpec::ExpSmoothing(params) => Box::new(ExpSmoothingModel::new(params.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelSpec::Arima { .. } => "arima",
            ModelSpec::ExpSmoothing(_) => "exp_smoothing",
        }
    }
}

/// ARIMA(p,d,q)：目標先標準化，d 次差分後以 Hannan-Rissanen 兩階段 OLS 估計
pub struct ArimaModel {
    p: usize,
    d: usize,
    q: usize,
    fitted: Option<FittedArima>,
}

struct FittedArima {
    scaler: Scaler,
    intercept: f64,
    phi: Vec<f64>,
    theta: Vec<f64>,
    /// 差分後序列的最後 p 個值（最新的在尾端）
    tail_values: Vec<f64>,
    /// 最後 q 個殘差（最新的在尾端）
    tail_residuals: Vec<f64>,
    /// 每層差分在資料結尾的值，用於還原積分
    last_levels: Vec<f64>,
}

impl ArimaModel {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self {
            p,
            d,
            q,
            fitted: None,
        }
    }

    fn min_observations(&self) -> usize {
        let h = self.p + self.q;
        // 兩階段估計各需要足夠的迴歸列
        self.d + 2 * h.max(1) + 2
    }
}

impl Forecaster for ArimaModel {
    fn name(&self) -> &'static str {
        "arima"
    }

    fn fit(&mut self, y: &[f64]) -> Result<()> {
        if y.len() < self.min_observations() {
            return Err(PipelineError::model(format!(
                "series of {} points is too short for ARIMA({},{},{}), need at least {}",
                y.len(),
                self.p,
                self.d,
                self.q,
                self.min_observations()
            )));
        }

        let scaler = Scaler::fit(y);
        let scaled = scaler.transform(y);

        let mut z = scaled;
        let mut last_levels = Vec::with_capacity(self.d);
        for _ in 0..self.d {
            last_levels.push(*z.last().expect("non-empty after length check"));
            z = z.windows(2).map(|w| w[1] - w[0]).collect();
        }

        let m = z.len();
        let (intercept, phi, theta, residuals) = if self.p == 0 && self.q == 0 {
            let mean = z.iter().sum::<f64>() / m as f64;
            let residuals: Vec<f64> = z.iter().map(|v| v - mean).collect();
            (mean, Vec::new(), Vec::new(), residuals)
        } else if self.q == 0 {
            // 純 AR：直接對 p 個滯後項做 OLS
            let (coef, residuals) = fit_ar(&z, self.p)?;
            (coef[0], coef[1..].to_vec(), Vec::new(), residuals)
        } else {
            hannan_rissanen(&z, self.p, self.q)?
        };

        let tail_values = z[m.saturating_sub(self.p)..].to_vec();
        let tail_residuals = residuals[residuals.len().saturating_sub(self.q)..].to_vec();

        self.fitted = Some(FittedArima {
            scaler,
            intercept,
            phi,
            theta,
            tail_values,
            tail_residuals,
            last_levels,
        });
        Ok(())
    }

    fn forecast(&self, steps: usize) -> Result<Vec<f64>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| PipelineError::model("model has not been fitted yet"))?;

        let mut values = fitted.tail_values.clone();
        let mut residuals = fitted.tail_residuals.clone();
        let mut forecasts = Vec::with_capacity(steps);

        for _ in 0..steps {
            let mut pred = fitted.intercept;
            for (i, coef) in fitted.phi.iter().enumerate() {
                pred += coef * values[values.len() - 1 - i];
            }
            for (j, coef) in fitted.theta.iter().enumerate() {
                pred += coef * residuals[residuals.len() - 1 - j];
            }
            forecasts.push(pred);
            values.push(pred);
            // 未來的創新項期望值為 0
            residuals.push(0.0);
        }

        // 逐層還原差分
        for level in (0..fitted.last_levels.len()).rev() {
            let mut running = fitted.last_levels[level];
            for value in forecasts.iter_mut() {
                running += *value;
                *value = running;
            }
        }

        Ok(fitted.scaler.inverse_transform(&forecasts))
    }
}

/// AR(order) 的 OLS 估計；回傳 [截距, 係數...] 與殘差
fn fit_ar(z: &[f64], order: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    let m = z.len();
    if m <= order + 1 {
        return Err(PipelineError::model(format!(
            "not enough observations ({}) to fit AR({})",
            m, order
        )));
    }

    let mut rows = Vec::with_capacity(m - order);
    let mut targets = Vec::with_capacity(m - order);
    for i in order..m {
        let mut row = Vec::with_capacity(order + 1);
        row.push(1.0);
        for lag in 1..=order {
            row.push(z[i - lag]);
        }
        rows.push(row);
        targets.push(z[i]);
    }

    let coef = ols(&rows, &targets)?;

    let mut residuals = vec![0.0; m];
    for i in order..m {
        let mut pred = coef[0];
        for lag in 1..=order {
            pred += coef[lag] * z[i - lag];
        }
        residuals[i] = z[i] - pred;
    }

    Ok((coef, residuals))
}

/// Hannan-Rissanen：先用長階 AR 估殘差，再對值與殘差的滯後項做 OLS
fn hannan_rissanen(z: &[f64], p: usize, q: usize) -> Result<(f64, Vec<f64>, Vec<f64>, Vec<f64>)> {
    let h = p + q;
    let (_, residuals) = fit_ar(z, h)?;

    let m = z.len();
    let start = h + q;
    if m <= start + p + q + 1 {
        return Err(PipelineError::model(format!(
            "not enough observations ({}) to estimate ARMA({},{})",
            m, p, q
        )));
    }

    let mut rows = Vec::with_capacity(m - start);
    let mut targets = Vec::with_capacity(m - start);
    for i in start..m {
        let mut row = Vec::with_capacity(1 + p + q);
        row.push(1.0);
        for lag in 1..=p {
            row.push(z[i - lag]);
        }
        for lag in 1..=q {
            row.push(residuals[i - lag]);
        }
        rows.push(row);
        targets.push(z[i]);
    }

    let coef = ols(&rows, &targets)?;
    let intercept = coef[0];
    let phi = coef[1..=p].to_vec();
    let theta = coef[p + 1..].to_vec();

    Ok((intercept, phi, theta, residuals))
}

/// 最小平方法：解正規方程式 (XᵀX)β = Xᵀy
fn ols(rows: &[Vec<f64>], targets: &[f64]) -> Result<Vec<f64>> {
    let k = rows[0].len();
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];

    for (row, y) in rows.iter().zip(targets) {
        for i in 0..k {
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
            xty[i] += row[i] * y;
        }
    }

    // 避免共線性造成奇異矩陣
    for (i, row) in xtx.iter_mut().enumerate() {
        row[i] += 1e-8;
    }

    solve(xtx, xty)
}

/// 部分選主元的高斯消去
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("non-empty range");
        if a[pivot_row][col].abs() < 1e-12 {
            return Err(PipelineError::model(
                "singular matrix in least-squares estimation",
            ));
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for col in row + 1..n {
            sum -= a[row][col] * x[col];
        }
        x[row] = sum / a[row][row];
    }

    Ok(x)
}

/// Holt-Winters 加法型平滑參數
#[derive(Debug, Clone)]
pub struct SmoothingParams {
    pub trend: bool,
    pub seasonal: bool,
    pub seasonal_periods: usize,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            trend: false,
            seasonal: false,
            seasonal_periods: 0,
            alpha: 0.3,
            beta: 0.1,
            gamma: 0.1,
        }
    }
}

/// 指數平滑（加法趨勢 / 加法季節性）；目標同樣先標準化
pub struct ExpSmoothingModel {
    params: SmoothingParams,
    fitted: Option<FittedSmoothing>,
}

struct FittedSmoothing {
    scaler: Scaler,
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
    n_observations: usize,
}

impl ExpSmoothingModel {
    pub fn new(params: SmoothingParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }
}

impl Forecaster for ExpSmoothingModel {
    fn name(&self) -> &'static str {
        "exp_smoothing"
    }

    fn fit(&mut self, y: &[f64]) -> Result<()> {
        let m = self.params.seasonal_periods;
        if self.params.seasonal {
            if m < 2 {
                return Err(PipelineError::model(
                    "seasonal smoothing requires seasonal_periods >= 2",
                ));
            }
            if y.len() < 2 * m {
                return Err(PipelineError::model(format!(
                    "seasonal smoothing with period {} needs at least {} points, got {}",
                    m,
                    2 * m,
                    y.len()
                )));
            }
        } else if y.len() < 2 {
            return Err(PipelineError::model(
                "exponential smoothing needs at least 2 points",
            ));
        }

        let scaler = Scaler::fit(y);
        let z = scaler.transform(y);
        let n = z.len();

        let (mut level, mut trend, mut seasonals, start) = if self.params.seasonal {
            let level: f64 = z[..m].iter().sum::<f64>() / m as f64;
            let trend = if self.params.trend {
                (0..m).map(|i| (z[m + i] - z[i]) / m as f64).sum::<f64>() / m as f64
            } else {
                0.0
            };
            let seasonals: Vec<f64> = (0..m).map(|i| z[i] - level).collect();
            (level, trend, seasonals, m)
        } else {
            let trend = if self.params.trend { z[1] - z[0] } else { 0.0 };
            (z[0], trend, Vec::new(), 1)
        };

        let (alpha, beta, gamma) = (self.params.alpha, self.params.beta, self.params.gamma);

        for (t, &value) in z.iter().enumerate().skip(start) {
            let season = if self.params.seasonal {
                seasonals[t % m]
            } else {
                0.0
            };
            let prev_level = level;

            level = alpha * (value - season) + (1.0 - alpha) * (level + trend);
            if self.params.trend {
                trend = beta * (level - prev_level) + (1.0 - beta) * trend;
            }
            if self.params.seasonal {
                seasonals[t % m] = gamma * (value - level) + (1.0 - gamma) * season;
            }
        }

        self.fitted = Some(FittedSmoothing {
            scaler,
            level,
            trend,
            seasonals,
            n_observations: n,
        });
        Ok(())
    }

    fn forecast(&self, steps: usize) -> Result<Vec<f64>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| PipelineError::model("model has not been fitted yet"))?;

        let m = self.params.seasonal_periods;
        let forecasts: Vec<f64> = (1..=steps)
            .map(|h| {
                let mut value = fitted.level + h as f64 * fitted.trend;
                if self.params.seasonal {
                    value += fitted.seasonals[(fitted.n_observations - 1 + h) % m];
                }
                value
            })
            .collect();

        Ok(fitted.scaler.inverse_transform(&forecasts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_forecast_before_fit_is_error() {
        let model = ArimaModel::new(1, 0, 0);
        assert!(model.forecast(3).is_err());

        let model = ExpSmoothingModel::new(SmoothingParams::default());
        assert!(model.forecast(3).is_err());
    }

    #[test]
    fn test_arima_too_short_series() {
        let mut model = ArimaModel::new(5, 1, 0);
        let err = model.fit(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_ar1_coefficient_recovery() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut y = vec![0.0_f64];
        for _ in 1..400 {
            let prev = *y.last().unwrap();
            y.push(0.6 * prev + rng.gen_range(-0.5..0.5));
        }

        let mut model = ArimaModel::new(1, 0, 0);
        model.fit(&y).unwrap();

        let fitted = model.fitted.as_ref().unwrap();
        assert!(
            (fitted.phi[0] - 0.6).abs() < 0.15,
            "estimated phi = {}",
            fitted.phi[0]
        );
    }

    #[test]
    fn test_arima_010_continues_linear_trend() {
        let y: Vec<f64> = (1..=30).map(|v| v as f64).collect();
        let mut model = ArimaModel::new(0, 1, 0);
        model.fit(&y).unwrap();

        let forecast = model.forecast(3).unwrap();
        assert!((forecast[0] - 31.0).abs() < 1e-6, "got {:?}", forecast);
        assert!((forecast[1] - 32.0).abs() < 1e-6);
        assert!((forecast[2] - 33.0).abs() < 1e-6);
    }

    #[test]
    fn test_arima_with_ma_component_fits_and_forecasts() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut noise: Vec<f64> = Vec::with_capacity(300);
        for _ in 0..300 {
            noise.push(rng.gen_range(-1.0..1.0));
        }
        let mut y = vec![0.0_f64];
        for t in 1..300 {
            y.push(0.5 * y[t - 1] + noise[t] + 0.4 * noise[t - 1]);
        }

        let mut model = ArimaModel::new(1, 0, 1);
        model.fit(&y).unwrap();
        let forecast = model.forecast(5).unwrap();

        assert_eq!(forecast.len(), 5);
        assert!(forecast.iter().all(|v| v.is_finite()));
        // 平穩序列的預測應落在資料範圍附近
        let max = y.iter().cloned().fold(f64::MIN, f64::max);
        let min = y.iter().cloned().fold(f64::MAX, f64::min);
        assert!(forecast.iter().all(|v| *v > min - 1.0 && *v < max + 1.0));
    }

    #[test]
    fn test_arima_evaluate_produces_metrics() {
        let y: Vec<f64> = (1..=40).map(|v| v as f64).collect();
        let (train, test) = y.split_at(35);

        let mut model = ArimaModel::new(0, 1, 0);
        model.fit(train).unwrap();
        let metrics = model.evaluate(test).unwrap();

        assert!(metrics.mae < 1e-6);
        assert!(metrics.mape.unwrap() < 1e-6);
    }

    #[test]
    fn test_holt_tracks_linear_trend_exactly() {
        let y: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        let mut model = ExpSmoothingModel::new(SmoothingParams {
            trend: true,
            ..SmoothingParams::default()
        });
        model.fit(&y).unwrap();

        let forecast = model.forecast(3).unwrap();
        assert!((forecast[0] - 21.0).abs() < 1e-6, "got {:?}", forecast);
        assert!((forecast[1] - 22.0).abs() < 1e-6);
        assert!((forecast[2] - 23.0).abs() < 1e-6);
    }

    #[test]
    fn test_seasonal_smoothing_repeats_stable_pattern() {
        let pattern = [10.0, 20.0, 30.0, 40.0];
        let y: Vec<f64> = (0..24).map(|i| pattern[i % 4]).collect();

        let mut model = ExpSmoothingModel::new(SmoothingParams {
            seasonal: true,
            seasonal_periods: 4,
            ..SmoothingParams::default()
        });
        model.fit(&y).unwrap();

        let forecast = model.forecast(4).unwrap();
        for (got, want) in forecast.iter().zip(pattern.iter()) {
            assert!((got - want).abs() < 1e-6, "got {:?}", forecast);
        }
    }

    #[test]
    fn test_seasonal_smoothing_needs_two_full_seasons() {
        let mut model = ExpSmoothingModel::new(SmoothingParams {
            seasonal: true,
            seasonal_periods: 12,
            ..SmoothingParams::default()
        });
        let err = model.fit(&(0..18).map(|v| v as f64).collect::<Vec<_>>()).unwrap_err();
        assert!(err.to_string().contains("at least 24"));
    }

    #[test]
    fn test_model_spec_builds_named_forecasters() {
        let arima = ModelSpec::Arima { p: 1, d: 0, q: 0 };
        assert_eq!(arima.build().name(), "arima");
        assert_eq!(arima.name(), "arima");

        let smoothing = ModelSpec::ExpSmoothing(SmoothingParams::default());
        assert_eq!(smoothing.build().name(), "exp_smoothing");
    }

    #[test]
    fn test_refit_overwrites_previous_state() {
        let rising: Vec<f64> = (1..=30).map(|v| v as f64).collect();
        let falling: Vec<f64> = (1..=30).map(|v| 100.0 - v as f64).collect();

        let mut model = ArimaModel::new(0, 1, 0);
        model.fit(&rising).unwrap();
        model.fit(&falling).unwrap();

        let forecast = model.forecast(1).unwrap();
        assert!((forecast[0] - 69.0).abs() < 1e-6, "got {:?}", forecast);
    }
}
