use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 從資料庫取回的時序資料：時間欄 + 目標值欄 + 其餘數值欄
#[derive(Debug, Clone, Default)]
pub struct SeriesFrame {
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
    pub extra: Vec<ExtraColumn>,
}

#[derive(Debug, Clone)]
pub struct ExtraColumn {
    pub name: String,
    pub values: Vec<f64>,
}

impl SeriesFrame {
    pub fn new(timestamps: Vec<NaiveDateTime>, values: Vec<f64>) -> Self {
        Self {
            timestamps,
            values,
            extra: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 所有欄位長度一致才算合法
    pub fn is_consistent(&self) -> bool {
        self.timestamps.len() == self.values.len()
            && self.extra.iter().all(|c| c.values.len() == self.values.len())
    }

    pub fn push_extra<S: Into<String>>(&mut self, name: S, values: Vec<f64>) {
        self.extra.push(ExtraColumn {
            name: name.into(),
            values,
        });
    }

    /// 相鄰時間點間距的中位數，用於推算預測點的時間戳
    pub fn median_step(&self) -> Option<Duration> {
        median_step(&self.timestamps)
    }
}

/// 相鄰時間點間距的中位數
pub fn median_step(timestamps: &[NaiveDateTime]) -> Option<Duration> {
    if timestamps.len() < 2 {
        return None;
    }
    let mut steps: Vec<i64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds())
        .collect();
    steps.sort_unstable();
    Some(Duration::seconds(steps[steps.len() / 2]))
}

/// 特徵工程後的監督式矩陣，每列對齊一個時間戳與目標值
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub timestamps: Vec<NaiveDateTime>,
    pub target: Vec<f64>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    /// 測試集含 0 時無法計算，紀錄為 None
    pub mape: Option<f64>,
}

impl EvalMetrics {
    pub fn between(actual: &[f64], predicted: &[f64]) -> Self {
        debug_assert_eq!(actual.len(), predicted.len());
        let n = actual.len() as f64;

        let mae = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p).abs())
            .sum::<f64>()
            / n;
        let mse = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p) * (a - p))
            .sum::<f64>()
            / n;
        let rmse = mse.sqrt();

        let mape = if actual.iter().any(|a| *a == 0.0) {
            None
        } else {
            Some(
                actual
                    .iter()
                    .zip(predicted)
                    .map(|(a, p)| ((a - p) / a).abs())
                    .sum::<f64>()
                    / n
                    * 100.0,
            )
        };

        Self {
            mae,
            mse,
            rmse,
            mape,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FoldMetrics {
    pub fold: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub metrics: EvalMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub folds: Vec<FoldMetrics>,
    pub mean_mae: f64,
    pub mean_rmse: f64,
    pub mean_mape: Option<f64>,
}

impl ValidationReport {
    pub fn from_folds(folds: Vec<FoldMetrics>) -> Self {
        let n = folds.len() as f64;
        let mean_mae = folds.iter().map(|f| f.metrics.mae).sum::<f64>() / n;
        let mean_rmse = folds.iter().map(|f| f.metrics.rmse).sum::<f64>() / n;

        let mapes: Vec<f64> = folds.iter().filter_map(|f| f.metrics.mape).collect();
        let mean_mape = if mapes.is_empty() {
            None
        } else {
            Some(mapes.iter().sum::<f64>() / mapes.len() as f64)
        };

        Self {
            folds,
            mean_mae,
            mean_rmse,
            mean_mape,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastPoint {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

/// 完整跑完一次管線的產出：預測點 + 交叉驗證結果
#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub model: String,
    pub horizon: usize,
    pub points: Vec<ForecastPoint>,
    pub validation: ValidationReport,
}
