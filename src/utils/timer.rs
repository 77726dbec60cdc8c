use std::time::Instant;

/// 計時器：量測單一階段的耗時並寫入日誌
pub struct Stopwatch {
    label: String,
    start: Instant,
}

impl Stopwatch {
    pub fn start<S: Into<String>>(label: S) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// 結束計時並記錄耗時，回傳經過秒數
    pub fn finish(self) -> f64 {
        let elapsed = self.elapsed_secs();
        tracing::info!("{} took {:.4}s", self.label, elapsed);
        elapsed
    }
}

/// 量測閉包執行時間
pub fn time_block<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let watch = Stopwatch::start(label);
    let result = f();
    watch.finish();
    result
}
