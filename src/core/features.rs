use crate::domain::model::{FeatureSet, SeriesFrame};
use crate::utils::error::{PipelineError, Result};
use chrono::{Datelike, Timelike};

/// 時序特徵工程：時間特徵 + 滑動窗口 + 滯後項
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    pub window_size: usize,
    pub lag_steps: usize,
    pub normalize: bool,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self {
            window_size: 7,
            lag_steps: 3,
            normalize: false,
        }
    }
}

impl FeatureBuilder {
    pub fn new(window_size: usize, lag_steps: usize, normalize: bool) -> Self {
        Self {
            window_size,
            lag_steps,
            normalize,
        }
    }

    /// 產出特徵矩陣；含 NaN 的列會被整列丟棄
    pub fn build(&self, frame: &SeriesFrame) -> Result<FeatureSet> {
        if frame.is_empty() {
            return Err(PipelineError::processing("cannot build features from an empty series"));
        }
        if !frame.is_consistent() {
            return Err(PipelineError::processing(
                "series frame columns have inconsistent lengths",
            ));
        }

        let n = frame.len();
        let mut names: Vec<String> = frame.extra.iter().map(|c| c.name.clone()).collect();
        let mut columns: Vec<Vec<f64>> = frame.extra.iter().map(|c| c.values.clone()).collect();

        names.push("hour".to_string());
        columns.push(
            frame
                .timestamps
                .iter()
                .map(|t| t.hour() as f64)
                .collect(),
        );

        // 週一為 0，與 pandas dayofweek 相同
        names.push("day_of_week".to_string());
        columns.push(
            frame
                .timestamps
                .iter()
                .map(|t| t.weekday().num_days_from_monday() as f64)
                .collect(),
        );

        names.push("rolling_mean".to_string());
        columns.push(rolling_mean(&frame.values, self.window_size));

        names.push("rolling_std".to_string());
        columns.push(rolling_std(&frame.values, self.window_size));

        for lag in 1..=self.lag_steps {
            names.push(format!("lag_{}", lag));
            columns.push(shift(&frame.values, lag));
        }

        // dropna：任一欄為 NaN 就丟整列
        let mut rows = Vec::new();
        let mut timestamps = Vec::new();
        let mut target = Vec::new();
        for i in 0..n {
            let row: Vec<f64> = columns.iter().map(|col| col[i]).collect();
            if row.iter().any(|v| v.is_nan()) || frame.values[i].is_nan() {
                continue;
            }
            rows.push(row);
            timestamps.push(frame.timestamps[i]);
            target.push(frame.values[i]);
        }

        if rows.is_empty() {
            return Err(PipelineError::processing(format!(
                "no rows left after feature building: series of {} points is too short for \
                 window_size={} and lag_steps={}",
                n, self.window_size, self.lag_steps
            )));
        }

        let mut features = FeatureSet {
            names,
            rows,
            timestamps,
            target,
        };

        if self.normalize {
            let scaler = Scaler::fit_columns(&features.rows);
            scaler.transform_columns(&mut features.rows);
        }

        Ok(features)
    }
}

fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if window == 0 || i + 1 < window {
                f64::NAN
            } else {
                let slice = &values[i + 1 - window..=i];
                slice.iter().sum::<f64>() / window as f64
            }
        })
        .collect()
}

/// 樣本標準差（ddof=1，與 pandas rolling().std() 相同）；window=1 時沒有定義
fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if window < 2 || i + 1 < window {
                f64::NAN
            } else {
                let slice = &values[i + 1 - window..=i];
                let mean = slice.iter().sum::<f64>() / window as f64;
                let var =
                    slice.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (window - 1) as f64;
                var.sqrt()
            }
        })
        .collect()
}

fn shift(values: &[f64], lag: usize) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, _)| if i < lag { f64::NAN } else { values[i - lag] })
        .collect()
}

/// z-score 標準化；零變異欄位只做平移（scale 視為 1）
#[derive(Debug, Clone)]
pub struct Scaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Scaler {
    /// 對單一序列做 fit
    pub fn fit(values: &[f64]) -> Self {
        let rows: Vec<Vec<f64>> = values.iter().map(|v| vec![*v]).collect();
        Self::fit_columns(&rows)
    }

    /// 逐欄 fit（母體標準差，ddof=0）
    pub fn fit_columns(rows: &[Vec<f64>]) -> Self {
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len() as f64;
        let mut means = vec![0.0; n_cols];
        let mut scales = vec![1.0; n_cols];

        for col in 0..n_cols {
            let mean = rows.iter().map(|r| r[col]).sum::<f64>() / n;
            let var = rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            means[col] = mean;
            scales[col] = if std == 0.0 { 1.0 } else { std };
        }

        Self { means, scales }
    }

    pub fn transform_columns(&self, rows: &mut [Vec<f64>]) {
        for row in rows.iter_mut() {
            for (col, value) in row.iter_mut().enumerate() {
                *value = (*value - self.means[col]) / self.scales[col];
            }
        }
    }

    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .map(|v| (v - self.means[0]) / self.scales[0])
            .collect()
    }

    pub fn inverse_transform(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .map(|v| v * self.scales[0] + self.means[0])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn hourly_frame(values: Vec<f64>) -> SeriesFrame {
        let start = NaiveDate::from_ymd_opt(2025, 1, 6) // 週一
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let timestamps: Vec<NaiveDateTime> = (0..values.len())
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect();
        SeriesFrame::new(timestamps, values)
    }

    #[test]
    fn test_rolling_mean_matches_pandas() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!((out[2] - 2.0).abs() < 1e-12);
        assert!((out[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_std_is_sample_std() {
        let out = rolling_std(&[1.0, 2.0, 3.0, 4.0], 3);
        // std([1,2,3], ddof=1) = 1
        assert!((out[2] - 1.0).abs() < 1e-12);
        assert!((out[3] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_std_window_one_undefined() {
        let out = rolling_std(&[1.0, 2.0], 1);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_shift_alignment() {
        let out = shift(&[10.0, 20.0, 30.0], 2);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!((out[2] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_build_drops_warmup_rows() {
        let frame = hourly_frame((1..=10).map(|v| v as f64).collect());
        let builder = FeatureBuilder::new(3, 2, false);
        let features = builder.build(&frame).unwrap();

        // 前 max(window-1, lag_steps) = 2 列含 NaN，應被丟掉
        assert_eq!(features.len(), 8);
        assert_eq!(
            features.names,
            vec![
                "hour",
                "day_of_week",
                "rolling_mean",
                "rolling_std",
                "lag_1",
                "lag_2"
            ]
        );

        // 第一個保留列是原始索引 2：hour=2、週一、mean=2、std=1、lag_1=2、lag_2=1
        assert_eq!(features.rows[0], vec![2.0, 0.0, 2.0, 1.0, 2.0, 1.0]);
        assert!((features.target[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_build_keeps_extra_columns_first() {
        let mut frame = hourly_frame(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        frame.push_extra("temperature", vec![20.0, 21.0, 22.0, 23.0, 24.0]);

        let features = FeatureBuilder::new(2, 1, false).build(&frame).unwrap();
        assert_eq!(features.names[0], "temperature");
        assert!((features.rows[0][0] - 21.0).abs() < 1e-12);
    }

    #[test]
    fn test_build_too_short_series_errors() {
        let frame = hourly_frame(vec![1.0, 2.0]);
        let err = FeatureBuilder::new(7, 3, false).build(&frame).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_build_empty_frame_errors() {
        let frame = SeriesFrame::default();
        assert!(FeatureBuilder::default().build(&frame).is_err());
    }

    #[test]
    fn test_scaler_round_trip() {
        let values = vec![10.0, 20.0, 30.0, 40.0];
        let scaler = Scaler::fit(&values);
        let scaled = scaler.transform(&values);
        let restored = scaler.inverse_transform(&scaled);

        let mean: f64 = scaled.iter().sum::<f64>() / scaled.len() as f64;
        assert!(mean.abs() < 1e-12);
        for (orig, back) in values.iter().zip(&restored) {
            assert!((orig - back).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scaler_zero_variance_column() {
        let rows = vec![vec![5.0, 1.0], vec![5.0, 2.0], vec![5.0, 3.0]];
        let scaler = Scaler::fit_columns(&rows);
        let mut scaled = rows.clone();
        scaler.transform_columns(&mut scaled);

        // 常數欄位置中後為 0，不會變成 NaN
        for row in &scaled {
            assert!((row[0] - 0.0).abs() < 1e-12);
            assert!(!row[1].is_nan());
        }
    }

    #[test]
    fn test_normalized_build_has_centered_features() {
        let frame = hourly_frame((1..=20).map(|v| v as f64).collect());
        let features = FeatureBuilder::new(3, 1, true).build(&frame).unwrap();

        for col in 0..features.names.len() {
            let mean: f64 =
                features.rows.iter().map(|r| r[col]).sum::<f64>() / features.len() as f64;
            assert!(mean.abs() < 1e-9, "column {} not centered", features.names[col]);
        }
    }
}
