use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Excel operation failed: {message}")]
    ExcelError { message: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Model error: {message}")]
    ModelError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// 錯誤嚴重程度，bin 依此決定退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Database,
    Processing,
    Model,
    Output,
    System,
}

impl PipelineError {
    pub fn excel<S: Into<String>>(message: S) -> Self {
        PipelineError::ExcelError {
            message: message.into(),
        }
    }

    pub fn processing<S: Into<String>>(message: S) -> Self {
        PipelineError::ProcessingError {
            message: message.into(),
        }
    }

    pub fn model<S: Into<String>>(message: S) -> Self {
        PipelineError::ModelError {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        PipelineError::ValidationError {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        PipelineError::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::DatabaseError(_) => ErrorCategory::Database,
            PipelineError::ExcelError { .. }
            | PipelineError::CsvError(_)
            | PipelineError::ZipError(_)
            | PipelineError::SerializationError(_) => ErrorCategory::Output,
            PipelineError::IoError(_) => ErrorCategory::System,
            PipelineError::ConfigError { .. }
            | PipelineError::ConfigValidationError { .. }
            | PipelineError::InvalidConfigValueError { .. }
            | PipelineError::MissingConfigError { .. } => ErrorCategory::Config,
            PipelineError::ProcessingError { .. } | PipelineError::ValidationError { .. } => {
                ErrorCategory::Processing
            }
            PipelineError::ModelError { .. } => ErrorCategory::Model,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 資料庫錯誤多半是暫時性的，重試即可
            ErrorCategory::Database => ErrorSeverity::Medium,
            ErrorCategory::Processing | ErrorCategory::Model | ErrorCategory::Output => {
                ErrorSeverity::High
            }
            ErrorCategory::Config | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            PipelineError::DatabaseError(_) => {
                "Check the database URL and that the MySQL server is reachable, then retry"
                    .to_string()
            }
            PipelineError::ExcelError { .. } => {
                "Verify the Excel template path, sheet names and column mapping".to_string()
            }
            PipelineError::CsvError(_) | PipelineError::SerializationError(_) => {
                "Inspect the report output settings and rerun".to_string()
            }
            PipelineError::ZipError(_) => {
                "Check free disk space and write permissions on the output path".to_string()
            }
            PipelineError::IoError(_) => "Check file paths and filesystem permissions".to_string(),
            PipelineError::ConfigError { .. }
            | PipelineError::ConfigValidationError { .. }
            | PipelineError::InvalidConfigValueError { .. }
            | PipelineError::MissingConfigError { .. } => {
                "Fix the configuration file and run again".to_string()
            }
            PipelineError::ProcessingError { .. } => {
                "The extracted series may be too short for the configured features; \
                 lower window_size/lag_steps or widen the query time range"
                    .to_string()
            }
            PipelineError::ModelError { .. } => {
                "Reduce the model order or provide more observations".to_string()
            }
            PipelineError::ValidationError { .. } => {
                "Lower n_splits or widen the query time range".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Config => format!("Configuration problem: {}", self),
            ErrorCategory::Database => format!("Database problem: {}", self),
            ErrorCategory::Processing => format!("Data processing problem: {}", self),
            ErrorCategory::Model => format!("Model problem: {}", self),
            ErrorCategory::Output => format!("Report output problem: {}", self),
            ErrorCategory::System => format!("System problem: {}", self),
        }
    }
}
