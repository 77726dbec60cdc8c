use crate::core::model::Forecaster;
use crate::domain::model::{FoldMetrics, ValidationReport};
use crate::utils::error::{PipelineError, Result};
use std::ops::Range;

/// 時序交叉驗證切分：訓練集逐步擴張，測試集等長往後推
#[derive(Debug, Clone)]
pub struct TimeSeriesSplit {
    pub n_splits: usize,
}

impl Default for TimeSeriesSplit {
    fn default() -> Self {
        Self { n_splits: 5 }
    }
}

impl TimeSeriesSplit {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<(Range<usize>, Range<usize>)>> {
        if self.n_splits < 2 {
            return Err(PipelineError::validation(
                "n_splits must be at least 2 for walk-forward validation",
            ));
        }

        let test_size = n_samples / (self.n_splits + 1);
        if test_size == 0 {
            return Err(PipelineError::validation(format!(
                "cannot split {} samples into {} folds",
                n_samples, self.n_splits
            )));
        }

        let folds = (0..self.n_splits)
            .map(|i| {
                let train_end = n_samples - (self.n_splits - i) * test_size;
                (0..train_end, train_end..train_end + test_size)
            })
            .collect();
        Ok(folds)
    }
}

/// 逐 fold 重新訓練模型並評估；回傳各 fold 指標與平均值
pub fn cross_validate(
    model: &mut dyn Forecaster,
    target: &[f64],
    n_splits: usize,
) -> Result<ValidationReport> {
    let splitter = TimeSeriesSplit::new(n_splits);
    let folds = splitter.split(target.len())?;

    let mut results = Vec::with_capacity(folds.len());
    for (fold, (train, test)) in folds.into_iter().enumerate() {
        let train_data = &target[train.clone()];
        let test_data = &target[test.clone()];

        model.fit(train_data)?;
        let metrics = model.evaluate(test_data)?;

        tracing::info!(
            "Fold {} (train={}, test={}): MAE={:.4}, RMSE={:.4}, MAPE={}",
            fold,
            train_data.len(),
            test_data.len(),
            metrics.mae,
            metrics.rmse,
            metrics
                .mape
                .map(|v| format!("{:.2}%", v))
                .unwrap_or_else(|| "n/a".to_string())
        );

        results.push(FoldMetrics {
            fold,
            train_size: train_data.len(),
            test_size: test_data.len(),
            metrics,
        });
    }

    Ok(ValidationReport::from_folds(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::EvalMetrics;

    #[test]
    fn test_split_matches_expanding_window_semantics() {
        let folds = TimeSeriesSplit::new(5).split(12).unwrap();

        // test_size = 12 / 6 = 2
        assert_eq!(folds.len(), 5);
        assert_eq!(folds[0], (0..2, 2..4));
        assert_eq!(folds[1], (0..4, 4..6));
        assert_eq!(folds[4], (0..10, 10..12));
    }

    #[test]
    fn test_split_test_windows_cover_series_tail() {
        let folds = TimeSeriesSplit::new(3).split(100).unwrap();
        assert_eq!(folds.last().unwrap().1.end, 100);

        for (train, test) in &folds {
            assert_eq!(train.end, test.start);
        }
    }

    #[test]
    fn test_split_too_few_samples() {
        assert!(TimeSeriesSplit::new(5).split(4).is_err());
    }

    #[test]
    fn test_split_rejects_single_fold() {
        assert!(TimeSeriesSplit::new(1).split(100).is_err());
    }

    /// 回傳固定值的假模型，記錄 fit 次數
    struct ConstantForecaster {
        value: f64,
        fit_calls: usize,
    }

    impl Forecaster for ConstantForecaster {
        fn name(&self) -> &'static str {
            "constant"
        }

        fn fit(&mut self, y: &[f64]) -> crate::utils::error::Result<()> {
            self.fit_calls += 1;
            self.value = y.iter().sum::<f64>() / y.len() as f64;
            Ok(())
        }

        fn forecast(&self, steps: usize) -> crate::utils::error::Result<Vec<f64>> {
            Ok(vec![self.value; steps])
        }
    }

    #[test]
    fn test_cross_validate_refits_per_fold() {
        let target: Vec<f64> = (1..=24).map(|v| v as f64).collect();
        let mut model = ConstantForecaster {
            value: 0.0,
            fit_calls: 0,
        };

        let report = cross_validate(&mut model, &target, 3).unwrap();

        assert_eq!(model.fit_calls, 3);
        assert_eq!(report.folds.len(), 3);
        // 訓練集必須逐 fold 擴張
        assert!(report.folds[0].train_size < report.folds[1].train_size);
        assert!(report.folds[1].train_size < report.folds[2].train_size);
    }

    #[test]
    fn test_cross_validate_constant_series_is_perfect() {
        let target = vec![5.0; 30];
        let mut model = ConstantForecaster {
            value: 0.0,
            fit_calls: 0,
        };

        let report = cross_validate(&mut model, &target, 4).unwrap();
        assert!(report.mean_mae < 1e-12);
        assert_eq!(report.mean_mape, Some(0.0));
    }

    #[test]
    fn test_fold_metrics_match_direct_computation() {
        let target: Vec<f64> = (0..20).map(|v| v as f64).collect();
        let mut model = ConstantForecaster {
            value: 0.0,
            fit_calls: 0,
        };

        let report = cross_validate(&mut model, &target, 2).unwrap();

        // 最後一個 fold：訓練 0..14（平均 6.5），測試 [14..20)
        let expected = EvalMetrics::between(
            &[14.0, 15.0, 16.0, 17.0, 18.0, 19.0],
            &[6.5; 6],
        );
        assert_eq!(report.folds[1].metrics, expected);
    }
}
