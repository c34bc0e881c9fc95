//! Parameterised SQL for the slurmdbd job table.
//!
//! Filters become a list of [`Predicate`]s over whitelisted [`Column`]s.
//! [`compile_where`] turns the list into placeholder SQL and a bind list, so
//! no caller-provided value is ever spliced into the statement text.

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, AdapterResult};
use crate::state::JobState;

/// Job table columns that may appear in a predicate or an `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    JobDbInx,
    JobId,
    JobName,
    UserId,
    Account,
    Partition,
    State,
    TimeSubmit,
    TimeStart,
    TimeEnd,
}

impl Column {
    /// Qualified column reference inside the job query.
    pub fn sql(&self) -> &'static str {
        match self {
            Column::JobDbInx => "j.job_db_inx",
            Column::JobId => "j.id_job",
            Column::JobName => "j.job_name",
            Column::UserId => "j.id_user",
            Column::Account => "j.account",
            Column::Partition => "j.`partition`",
            // Flag bits above the base state are masked off.
            Column::State => "(j.state & 0xff)",
            Column::TimeSubmit => "j.time_submit",
            Column::TimeStart => "j.time_start",
            Column::TimeEnd => "j.time_end",
        }
    }
}

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    In,
    Ge,
    Le,
}

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Int(i64),
    Text(String),
}

/// One `(column, operator, bound)` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub column: Column,
    pub op: Op,
    pub values: Vec<BindValue>,
}

impl Predicate {
    pub fn eq(column: Column, value: BindValue) -> Self {
        Self {
            column,
            op: Op::Eq,
            values: vec![value],
        }
    }

    pub fn one_of(column: Column, values: Vec<BindValue>) -> Self {
        Self {
            column,
            op: Op::In,
            values,
        }
    }

    pub fn at_least(column: Column, value: i64) -> Self {
        Self {
            column,
            op: Op::Ge,
            values: vec![BindValue::Int(value)],
        }
    }

    pub fn at_most(column: Column, value: i64) -> Self {
        Self {
            column,
            op: Op::Le,
            values: vec![BindValue::Int(value)],
        }
    }
}

/// Compile predicates into a `WHERE` clause (empty when unfiltered) and binds.
///
/// An `In` predicate without values matches nothing.
pub fn compile_where(predicates: &[Predicate]) -> (String, Vec<BindValue>) {
    if predicates.is_empty() {
        return (String::new(), Vec::new());
    }
    let mut clauses = Vec::with_capacity(predicates.len());
    let mut binds = Vec::new();
    for predicate in predicates {
        let column = predicate.column.sql();
        let clause = match predicate.op {
            Op::In if predicate.values.is_empty() => "1 = 0".to_string(),
            Op::In => {
                let marks = vec!["?"; predicate.values.len()].join(", ");
                format!("{column} IN ({marks})")
            }
            Op::Eq => format!("{column} = ?"),
            Op::Ge => format!("{column} >= ?"),
            Op::Le => format!("{column} <= ?"),
        };
        clauses.push(clause);
        binds.extend(predicate.values.iter().cloned());
    }
    (format!(" WHERE {}", clauses.join(" AND ")), binds)
}

/// Inclusive Unix-seconds range; an open end is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// Conjunctive filter over the job table. Empty fields do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub accounts: Vec<String>,
    /// Users already resolved to uids.
    pub user_ids: Vec<u32>,
    pub states: Vec<JobState>,
    pub job_id: Option<i64>,
    pub job_name: Option<String>,
    pub submit_time: Option<TimeRange>,
    pub end_time: Option<TimeRange>,
}

impl JobFilter {
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if !self.accounts.is_empty() {
            predicates.push(Predicate::one_of(
                Column::Account,
                self.accounts
                    .iter()
                    .cloned()
                    .map(BindValue::Text)
                    .collect(),
            ));
        }
        if !self.user_ids.is_empty() {
            predicates.push(Predicate::one_of(
                Column::UserId,
                self.user_ids
                    .iter()
                    .map(|uid| BindValue::Int(i64::from(*uid)))
                    .collect(),
            ));
        }
        if !self.states.is_empty() {
            predicates.push(Predicate::one_of(
                Column::State,
                self.states
                    .iter()
                    .map(|s| BindValue::Int(s.code()))
                    .collect(),
            ));
        }
        if let Some(job_id) = self.job_id {
            predicates.push(Predicate::eq(Column::JobId, BindValue::Int(job_id)));
        }
        if let Some(name) = &self.job_name {
            predicates.push(Predicate::eq(Column::JobName, BindValue::Text(name.clone())));
        }
        for (column, range) in [
            (Column::TimeSubmit, self.submit_time),
            (Column::TimeEnd, self.end_time),
        ] {
            let Some(range) = range else { continue };
            if let Some(start) = range.start {
                predicates.push(Predicate::at_least(column, start));
            }
            if let Some(end) = range.end {
                predicates.push(Predicate::at_most(column, end));
            }
        }
        predicates
    }
}

/// Fields a job listing may be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    JobDbInx,
    JobId,
    JobName,
    Account,
    Partition,
    State,
    SubmitTime,
    StartTime,
    EndTime,
}

impl SortField {
    /// Parse a client-supplied sort key; anything else is rejected.
    pub fn parse(name: &str) -> AdapterResult<Self> {
        match name.trim() {
            "job_db_inx" => Ok(SortField::JobDbInx),
            "job_id" | "id_job" => Ok(SortField::JobId),
            "job_name" | "name" => Ok(SortField::JobName),
            "account" => Ok(SortField::Account),
            "partition" => Ok(SortField::Partition),
            "state" => Ok(SortField::State),
            "submit_time" | "time_submit" => Ok(SortField::SubmitTime),
            "start_time" | "time_start" => Ok(SortField::StartTime),
            "end_time" | "time_end" => Ok(SortField::EndTime),
            other => Err(AdapterError::InvalidArgument(format!(
                "unknown sort field: {other}"
            ))),
        }
    }

    pub fn column(&self) -> Column {
        match self {
            SortField::JobDbInx => Column::JobDbInx,
            SortField::JobId => Column::JobId,
            SortField::JobName => Column::JobName,
            SortField::Account => Column::Account,
            SortField::Partition => Column::Partition,
            SortField::State => Column::State,
            SortField::SubmitTime => Column::TimeSubmit,
            SortField::StartTime => Column::TimeStart,
            SortField::EndTime => Column::TimeEnd,
        }
    }
}

/// Requested ordering of a job listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSort {
    pub field: SortField,
    pub descending: bool,
}

impl Default for JobSort {
    fn default() -> Self {
        Self {
            field: SortField::JobDbInx,
            descending: false,
        }
    }
}

impl JobSort {
    fn order_by(&self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!(" ORDER BY {} {direction}", self.field.column().sql())
    }
}

/// 1-based page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> AdapterResult<Self> {
        if number == 0 || size == 0 {
            return Err(AdapterError::InvalidArgument(format!(
                "page number and size must be positive (got page {number}, size {size})"
            )));
        }
        Ok(Self { number, size })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.size) * u64::from(self.number.saturating_sub(1))
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }
}

/// How text columns of the store are encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    Utf8,
    #[default]
    Utf8mb4,
    /// UTF-8 bytes stored in latin1 columns; re-interpreted on read.
    Latin1,
}

impl TextEncoding {
    /// Select expression reading a text column as UTF-8.
    pub fn read(&self, expr: &str) -> String {
        match self {
            TextEncoding::Utf8 | TextEncoding::Utf8mb4 => expr.to_string(),
            TextEncoding::Latin1 => {
                format!("CONVERT(CAST(CONVERT({expr} USING latin1) AS BINARY) USING utf8mb4)")
            }
        }
    }
}

impl std::str::FromStr for TextEncoding {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" => Ok(TextEncoding::Utf8),
            "utf8mb4" => Ok(TextEncoding::Utf8mb4),
            "latin1" => Ok(TextEncoding::Latin1),
            other => Err(AdapterError::InvalidArgument(format!(
                "unsupported text encoding: {other}"
            ))),
        }
    }
}

/// A compiled job listing: row query, count query and their shared binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSelect {
    pub rows_sql: String,
    pub count_sql: String,
    pub binds: Vec<BindValue>,
}

/// Build the row and count statements for a job listing.
///
/// `job_table` and `qos_table` must already be validated identifiers.
pub fn compile_job_select(
    job_table: &str,
    qos_table: &str,
    encoding: TextEncoding,
    predicates: &[Predicate],
    sort: JobSort,
    page: Option<Page>,
) -> JobSelect {
    let (where_sql, binds) = compile_where(predicates);
    let from = format!(" FROM `{job_table}` j LEFT JOIN `{qos_table}` q ON q.id = j.id_qos");

    let mut rows_sql = format!("SELECT {}{from}{where_sql}", job_columns(encoding));
    rows_sql.push_str(&sort.order_by());
    if let Some(page) = page {
        rows_sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit(), page.offset()));
    }

    JobSelect {
        rows_sql,
        count_sql: format!("SELECT COUNT(*){from}{where_sql}"),
        binds,
    }
}

/// Select list of a job record. Unsigned columns are cast to signed.
pub fn job_columns(encoding: TextEncoding) -> String {
    const INTS: [&str; 9] = [
        "job_db_inx",
        "id_job",
        "id_user",
        "state",
        "time_submit",
        "time_start",
        "time_end",
        "time_suspended",
        "timelimit",
    ];
    const TEXTS: [&str; 7] = [
        "job_name",
        "account",
        "partition",
        "tres_alloc",
        "tres_req",
        "work_dir",
        "nodelist",
    ];
    let mut columns: Vec<String> = INTS
        .iter()
        .map(|c| format!("CAST(j.`{c}` AS SIGNED) AS `{c}`"))
        .collect();
    columns.extend(TEXTS.iter().map(|c| {
        let expr = format!("COALESCE(j.`{c}`, '')");
        format!("{} AS `{c}`", encoding.read(&expr))
    }));
    columns.push(format!(
        "{} AS `qos`",
        encoding.read("COALESCE(q.name, '')")
    ));
    columns.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_offsets() {
        assert_eq!(Page::new(1, 10).unwrap().offset(), 0);
        assert_eq!(Page::new(3, 10).unwrap().offset(), 20);
        assert_eq!(Page::new(3, 10).unwrap().limit(), 10);
        assert!(Page::new(0, 10).is_err());
        assert!(Page::new(1, 0).is_err());
    }

    #[test]
    fn test_compile_where_binds_in_order() {
        let filter = JobFilter {
            accounts: vec!["acme".into(), "beta".into()],
            user_ids: vec![1001],
            states: vec![JobState::Pending, JobState::Cancelled],
            job_name: Some("x'; DROP TABLE t; --".into()),
            submit_time: Some(TimeRange {
                start: Some(100),
                end: None,
            }),
            ..Default::default()
        };
        let (sql, binds) = compile_where(&filter.predicates());
        assert_eq!(
            sql,
            " WHERE j.account IN (?, ?) AND j.id_user IN (?) AND (j.state & 0xff) IN (?, ?) \
             AND j.job_name = ? AND j.time_submit >= ?"
        );
        assert_eq!(
            binds,
            vec![
                BindValue::Text("acme".into()),
                BindValue::Text("beta".into()),
                BindValue::Int(1001),
                BindValue::Int(0),
                BindValue::Int(4),
                BindValue::Text("x'; DROP TABLE t; --".into()),
                BindValue::Int(100),
            ]
        );
    }

    #[test]
    fn test_compile_where_empty() {
        let (sql, binds) = compile_where(&JobFilter::default().predicates());
        assert!(sql.is_empty());
        assert!(binds.is_empty());

        let (sql, _) = compile_where(&[Predicate::one_of(Column::JobId, vec![])]);
        assert_eq!(sql, " WHERE 1 = 0");
    }

    #[test]
    fn test_compile_job_select_default_sort_and_page() {
        let select = compile_job_select(
            "linux_job_table",
            "qos_table",
            TextEncoding::Utf8mb4,
            &[Predicate::eq(Column::JobId, BindValue::Int(7))],
            JobSort::default(),
            Some(Page::new(3, 25).unwrap()),
        );
        assert!(select.rows_sql.contains("FROM `linux_job_table` j"));
        assert!(
            select
                .rows_sql
                .ends_with("WHERE j.id_job = ? ORDER BY j.job_db_inx ASC LIMIT 25 OFFSET 50")
        );
        assert!(select.count_sql.starts_with("SELECT COUNT(*) FROM"));
        assert!(select.count_sql.ends_with("WHERE j.id_job = ?"));
        assert!(!select.count_sql.contains("LIMIT"));
        assert_eq!(select.binds, vec![BindValue::Int(7)]);
    }

    #[test]
    fn test_latin1_columns_are_reinterpreted() {
        let columns = job_columns(TextEncoding::Latin1);
        assert!(columns.contains(
            "CONVERT(CAST(CONVERT(COALESCE(j.`job_name`, '') USING latin1) AS BINARY) USING utf8mb4) AS `job_name`"
        ));
        let columns = job_columns(TextEncoding::Utf8);
        assert!(columns.contains("COALESCE(j.`job_name`, '') AS `job_name`"));
        assert!(columns.contains("CAST(j.`id_job` AS SIGNED) AS `id_job`"));
    }

    #[test]
    fn test_sort_field_whitelist() {
        assert_eq!(SortField::parse("submit_time").unwrap(), SortField::SubmitTime);
        assert_eq!(SortField::parse("id_job").unwrap(), SortField::JobId);
        let err = SortField::parse("job_id; DROP").unwrap_err();
        assert!(matches!(err, AdapterError::InvalidArgument(_)));
    }

    #[test]
    fn test_text_encoding_from_str() {
        assert_eq!("LATIN1".parse::<TextEncoding>().unwrap(), TextEncoding::Latin1);
        assert!("ebcdic".parse::<TextEncoding>().is_err());
    }
}
