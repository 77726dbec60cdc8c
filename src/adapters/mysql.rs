use crate::domain::model::SeriesFrame;
use crate::domain::ports::SeriesSource;
use crate::utils::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Avg,
    Sum,
    Max,
    Min,
    Count,
}

impl Aggregation {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Aggregation::Avg => "AVG",
            Aggregation::Sum => "SUM",
            Aggregation::Max => "MAX",
            Aggregation::Min => "MIN",
            Aggregation::Count => "COUNT",
        }
    }
}

impl std::str::FromStr for Aggregation {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AVG" => Ok(Aggregation::Avg),
            "SUM" => Ok(Aggregation::Sum),
            "MAX" => Ok(Aggregation::Max),
            "MIN" => Ok(Aggregation::Min),
            "COUNT" => Ok(Aggregation::Count),
            other => Err(PipelineError::InvalidConfigValueError {
                field: "database.aggregation.function".to_string(),
                value: other.to_string(),
                reason: "Supported: AVG, SUM, MAX, MIN, COUNT".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInterval {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl TimeInterval {
    /// MySQL 的時間桶運算式
    pub fn bucket_expr(&self, time_column: &str) -> String {
        match self {
            TimeInterval::Hourly => {
                format!("DATE_FORMAT(`{}`, '%Y-%m-%d %H:00:00')", time_column)
            }
            TimeInterval::Daily => format!("DATE(`{}`)", time_column),
            TimeInterval::Weekly => format!(
                "DATE_SUB(DATE(`{}`), INTERVAL WEEKDAY(`{}`) DAY)",
                time_column, time_column
            ),
            TimeInterval::Monthly => format!("DATE_FORMAT(`{}`, '%Y-%m-01')", time_column),
        }
    }
}

impl std::str::FromStr for TimeInterval {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "1H" => Ok(TimeInterval::Hourly),
            "1D" => Ok(TimeInterval::Daily),
            "1W" => Ok(TimeInterval::Weekly),
            "1M" => Ok(TimeInterval::Monthly),
            other => Err(PipelineError::InvalidConfigValueError {
                field: "database.aggregation.interval".to_string(),
                value: other.to_string(),
                reason: "Supported: 1H, 1D, 1W, 1M".to_string(),
            }),
        }
    }
}

/// 時序查詢規格；值一律用參數繫結，識別字用反引號括起
#[derive(Debug, Clone, Default)]
pub struct SeriesQuery {
    pub table: String,
    pub time_column: String,
    pub value_column: String,
    pub additional_columns: Vec<String>,
    pub start_time: Option<NaiveDateTime>,
    /// 含上界（原始時間範圍查詢）
    pub end_time: Option<NaiveDateTime>,
    /// 不含上界（月／年區間）
    pub end_before: Option<NaiveDateTime>,
    pub where_conditions: BTreeMap<String, String>,
    pub aggregation: Option<(Aggregation, TimeInterval)>,
}

impl SeriesQuery {
    pub fn new<S: Into<String>>(table: S, time_column: S, value_column: S) -> Self {
        Self {
            table: table.into(),
            time_column: time_column.into(),
            value_column: value_column.into(),
            ..Default::default()
        }
    }

    pub fn with_range(
        mut self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn with_condition<S: Into<String>>(mut self, column: S, value: S) -> Self {
        self.where_conditions.insert(column.into(), value.into());
        self
    }

    pub fn with_additional_columns(mut self, columns: Vec<String>) -> Self {
        self.additional_columns = columns;
        self
    }

    pub fn aggregated(mut self, function: Aggregation, interval: TimeInterval) -> Self {
        self.aggregation = Some((function, interval));
        self
    }

    /// 限定在 today 所屬月份（半開區間）
    pub fn current_month(mut self, today: NaiveDate) -> Self {
        let (start, end) = month_range(today);
        self.start_time = Some(start);
        self.end_before = Some(end);
        self
    }

    /// 限定在 today 所屬年份（半開區間）
    pub fn current_year(mut self, today: NaiveDate) -> Self {
        let (start, end) = year_range(today);
        self.start_time = Some(start);
        self.end_before = Some(end);
        self
    }

    /// 組出 SQL 與繫結值
    pub fn to_sql(&self) -> (String, Vec<String>) {
        let mut sql = match &self.aggregation {
            Some((function, interval)) => format!(
                "SELECT {} as time_interval, {}(`{}`) as value FROM `{}`",
                interval.bucket_expr(&self.time_column),
                function.as_sql(),
                self.value_column,
                self.table
            ),
            None => {
                let mut select = format!("SELECT `{}`, `{}`", self.time_column, self.value_column);
                for col in &self.additional_columns {
                    select.push_str(&format!(", `{}`", col));
                }
                format!("{} FROM `{}`", select, self.table)
            }
        };

        let mut conditions = Vec::new();
        let mut binds = Vec::new();

        if let Some(start) = self.start_time {
            conditions.push(format!("`{}` >= ?", self.time_column));
            binds.push(format_datetime(start));
        }
        if let Some(end) = self.end_time {
            conditions.push(format!("`{}` <= ?", self.time_column));
            binds.push(format_datetime(end));
        }
        if let Some(end) = self.end_before {
            conditions.push(format!("`{}` < ?", self.time_column));
            binds.push(format_datetime(end));
        }
        for (column, value) in &self.where_conditions {
            conditions.push(format!("`{}` = ?", column));
            binds.push(value.clone());
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if self.aggregation.is_some() {
            sql.push_str(" GROUP BY time_interval ORDER BY time_interval");
        } else {
            sql.push_str(&format!(" ORDER BY `{}`", self.time_column));
        }

        (sql, binds)
    }
}

fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn month_range(today: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).expect("valid month start");
    let end = if today.month() < 12 {
        NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
    }
    .expect("valid next month start");
    (
        start.and_hms_opt(0, 0, 0).expect("midnight"),
        end.and_hms_opt(0, 0, 0).expect("midnight"),
    )
}

pub fn year_range(today: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).expect("valid year start");
    let end = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).expect("valid next year start");
    (
        start.and_hms_opt(0, 0, 0).expect("midnight"),
        end.and_hms_opt(0, 0, 0).expect("midnight"),
    )
}

/// 以 MySQL 為後端的時序資料來源
pub struct MySqlSeriesSource {
    pool: MySqlPool,
    query: SeriesQuery,
}

impl MySqlSeriesSource {
    pub async fn connect(url: &str, query: SeriesQuery) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        tracing::info!("Connected to MySQL database");
        Ok(Self { pool, query })
    }

    pub fn new(pool: MySqlPool, query: SeriesQuery) -> Self {
        Self { pool, query }
    }
}

#[async_trait]
impl SeriesSource for MySqlSeriesSource {
    async fn fetch(&self) -> Result<SeriesFrame> {
        let (sql, binds) = self.query.to_sql();
        tracing::debug!("Executing query: {}", sql);

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        tracing::info!("Fetched {} rows from `{}`", rows.len(), self.query.table);

        let aggregated = self.query.aggregation.is_some();
        let time_name: &str = if aggregated {
            "time_interval"
        } else {
            &self.query.time_column
        };
        let value_name: &str = if aggregated {
            "value"
        } else {
            &self.query.value_column
        };

        let mut frame = SeriesFrame::default();
        for row in &rows {
            frame.timestamps.push(decode_timestamp(row, time_name)?);
            frame.values.push(decode_numeric(row, value_name)?);
        }

        if !aggregated {
            for col in &self.query.additional_columns {
                let mut values = Vec::with_capacity(rows.len());
                for row in &rows {
                    values.push(decode_numeric(row, col)?);
                }
                frame.push_extra(col.clone(), values);
            }
        }

        Ok(frame)
    }
}

/// 時間欄可能是 DATETIME、DATE，聚合查詢則是字串桶
fn decode_timestamp(row: &MySqlRow, column: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = row.try_get::<NaiveDateTime, _>(column) {
        return Ok(dt);
    }
    if let Ok(date) = row.try_get::<NaiveDate, _>(column) {
        return Ok(date.and_hms_opt(0, 0, 0).expect("midnight"));
    }
    let raw = row.try_get::<String, _>(column)?;
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight"))
        })
        .map_err(|e| {
            PipelineError::processing(format!(
                "cannot parse '{}' in column '{}' as a timestamp: {}",
                raw, column, e
            ))
        })
}

/// NULL 轉為 NaN，讓特徵工程的 dropna 處理
fn decode_numeric(row: &MySqlRow, column: &str) -> Result<f64> {
    if let Ok(v) = row.try_get::<Option<f64>, _>(column) {
        return Ok(v.unwrap_or(f64::NAN));
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(column) {
        return Ok(v.map(|v| v as f64).unwrap_or(f64::NAN));
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(column) {
        return Ok(v.map(|v| v as f64).unwrap_or(f64::NAN));
    }
    let v = row.try_get::<Option<i32>, _>(column)?;
    Ok(v.map(|v| v as f64).unwrap_or(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_query() -> SeriesQuery {
        SeriesQuery::new("sensor_data", "timestamp", "value")
    }

    #[test]
    fn test_plain_query_orders_by_time() {
        let (sql, binds) = base_query().to_sql();
        assert_eq!(
            sql,
            "SELECT `timestamp`, `value` FROM `sensor_data` ORDER BY `timestamp`"
        );
        assert!(binds.is_empty());
    }

    #[test]
    fn test_query_with_range_and_conditions() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();

        let (sql, binds) = base_query()
            .with_range(Some(start), Some(end))
            .with_condition("device_type", "heater")
            .with_condition("area", "north")
            .to_sql();

        assert_eq!(
            sql,
            "SELECT `timestamp`, `value` FROM `sensor_data` WHERE \
             `timestamp` >= ? AND `timestamp` <= ? AND `area` = ? AND `device_type` = ? \
             ORDER BY `timestamp`"
        );
        // BTreeMap 保證 WHERE 條件順序穩定（字母序）
        assert_eq!(
            binds,
            vec![
                "2025-01-01 00:00:00".to_string(),
                "2025-01-31 23:59:59".to_string(),
                "north".to_string(),
                "heater".to_string(),
            ]
        );
    }

    #[test]
    fn test_query_with_additional_columns() {
        let (sql, _) = base_query()
            .with_additional_columns(vec!["temperature".to_string(), "humidity".to_string()])
            .to_sql();
        assert!(sql.starts_with(
            "SELECT `timestamp`, `value`, `temperature`, `humidity` FROM `sensor_data`"
        ));
    }

    #[test]
    fn test_daily_aggregation_query() {
        let (sql, _) = base_query()
            .aggregated(Aggregation::Avg, TimeInterval::Daily)
            .to_sql();
        assert_eq!(
            sql,
            "SELECT DATE(`timestamp`) as time_interval, AVG(`value`) as value \
             FROM `sensor_data` GROUP BY time_interval ORDER BY time_interval"
        );
    }

    #[test]
    fn test_weekly_aggregation_bucket() {
        let expr = TimeInterval::Weekly.bucket_expr("ts");
        assert_eq!(
            expr,
            "DATE_SUB(DATE(`ts`), INTERVAL WEEKDAY(`ts`) DAY)"
        );
    }

    #[test]
    fn test_monthly_aggregation_with_bounds() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        let (sql, binds) = base_query()
            .with_range(Some(start), None)
            .aggregated(Aggregation::Sum, TimeInterval::Monthly)
            .to_sql();

        assert_eq!(
            sql,
            "SELECT DATE_FORMAT(`timestamp`, '%Y-%m-01') as time_interval, \
             SUM(`value`) as value FROM `sensor_data` WHERE `timestamp` >= ? \
             GROUP BY time_interval ORDER BY time_interval"
        );
        assert_eq!(binds, vec!["2025-03-01 00:00:00".to_string()]);
    }

    #[test]
    fn test_current_month_uses_half_open_interval() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let (sql, binds) = base_query().current_month(today).to_sql();

        assert!(sql.contains("`timestamp` >= ?"));
        assert!(sql.contains("`timestamp` < ?"));
        assert!(!sql.contains("<= ?"));
        assert_eq!(
            binds,
            vec![
                "2025-06-01 00:00:00".to_string(),
                "2025-07-01 00:00:00".to_string(),
            ]
        );
    }

    #[test]
    fn test_month_range_december_rollover() {
        let (start, end) = month_range(NaiveDate::from_ymd_opt(2024, 12, 20).unwrap());
        assert_eq!(format_datetime(start), "2024-12-01 00:00:00");
        assert_eq!(format_datetime(end), "2025-01-01 00:00:00");
    }

    #[test]
    fn test_year_range() {
        let (start, end) = year_range(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
        assert_eq!(format_datetime(start), "2025-01-01 00:00:00");
        assert_eq!(format_datetime(end), "2026-01-01 00:00:00");
    }

    #[test]
    fn test_aggregation_and_interval_parsing() {
        assert_eq!("avg".parse::<Aggregation>().unwrap(), Aggregation::Avg);
        assert_eq!("SUM".parse::<Aggregation>().unwrap(), Aggregation::Sum);
        assert!("median".parse::<Aggregation>().is_err());

        assert_eq!("1d".parse::<TimeInterval>().unwrap(), TimeInterval::Daily);
        assert_eq!("1W".parse::<TimeInterval>().unwrap(), TimeInterval::Weekly);
        assert!("15m".parse::<TimeInterval>().is_err());
    }
}
