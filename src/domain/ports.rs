use crate::domain::model::{FeatureSet, SeriesFrame, ValidationReport};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 時序資料來源；查詢條件在建構 adapter 時決定
#[async_trait]
pub trait SeriesSource: Send + Sync {
    async fn fetch(&self) -> Result<SeriesFrame>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<SeriesFrame>;
    async fn transform(&self, frame: SeriesFrame) -> Result<FeatureSet>;
    async fn evaluate(&self, features: &FeatureSet) -> Result<ValidationReport>;
    async fn load(&self, features: FeatureSet, validation: ValidationReport) -> Result<String>;
}
