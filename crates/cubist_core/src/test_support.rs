//! In-memory engine doubles for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::engine::{EngineSession, EngineSessionFactory, MetadataFilter, MetadataRow, SystemView};
use crate::error::CubistError;
use crate::models::{
    ColumnDescription, ConnectionDescriptor, ConnectionIdentity, MeasureInfo, QueryRows,
    RelationshipView,
};
use crate::services::metadata::{ModelMetadataSource, SessionMetadataSource};

pub const TEST_ENDPOINT: &str = "powerbi://api.powerbi.com/v1.0/myorg/Contoso";

/// Descriptor for `catalog` on the test endpoint.
pub fn descriptor(catalog: &str) -> ConnectionDescriptor {
    ConnectionDescriptor::new(ConnectionIdentity::new(TEST_ENDPOINT, catalog), None)
}

fn row(value: Value) -> MetadataRow {
    match value {
        Value::Object(map) => MetadataRow::new(map),
        other => panic!("metadata rows must be objects, got {other}"),
    }
}

/// A tabular model held in memory.
pub struct FakeEngine {
    views: Mutex<HashMap<SystemView, Vec<MetadataRow>>>,
    data: Mutex<HashMap<String, QueryRows>>,
    canned: Mutex<HashMap<String, QueryRows>>,
    failing: Mutex<HashSet<SystemView>>,
    reads: Mutex<HashMap<SystemView, usize>>,
    queries: AtomicUsize,
}

impl FakeEngine {
    /// Sales, Customer, Product and Date tables, plus a measure-only
    /// `_Measures` table and the hidden tables discovery must skip.
    pub fn sales_model() -> Arc<Self> {
        let mut views = HashMap::new();

        views.insert(
            SystemView::SchemaTables,
            vec![
                row(json!({"TABLE_NAME": "Sales", "TABLE_SCHEMA": "Model"})),
                row(json!({"TABLE_NAME": "Customer", "TABLE_SCHEMA": "Model"})),
                row(json!({"TABLE_NAME": "Product", "TABLE_SCHEMA": "Model"})),
                row(json!({"TABLE_NAME": "Date", "TABLE_SCHEMA": "Model"})),
                row(json!({"TABLE_NAME": "_Measures", "TABLE_SCHEMA": "Model"})),
                row(json!({"TABLE_NAME": "$Sales", "TABLE_SCHEMA": "Model"})),
                row(json!({"TABLE_NAME": "DateTableTemplate_7f1c", "TABLE_SCHEMA": "Model"})),
                row(json!({"TABLE_NAME": "DISCOVER_CALC_DEPENDENCY", "TABLE_SCHEMA": "$SYSTEM"})),
            ],
        );

        views.insert(
            SystemView::Tables,
            vec![
                row(json!({"ID": 1, "Name": "Sales", "Description": "Order lines"})),
                row(json!({"ID": 2, "Name": "Customer", "Description": ""})),
                row(json!({"ID": 3, "Name": "Product", "Description": "Catalog items"})),
                row(json!({"ID": 4, "Name": "Date", "Description": "Calendar"})),
                row(json!({"ID": 5, "Name": "_Measures", "Description": "Report measures"})),
                row(json!({"ID": 6, "Name": "DateTableTemplate_7f1c", "Description": ""})),
            ],
        );

        views.insert(
            SystemView::Columns,
            vec![
                column(101, "OrderKey", 1, None, 6),
                column(102, "CustomerKey", 1, None, 6),
                column(103, "ProductKey", 1, None, 6),
                column(104, "OrderDate", 1, None, 9),
                column(105, "Amount", 1, Some("Line amount"), 10),
                column(203, "Region", 2, Some("Sales region"), 2),
                column(201, "CustomerKey", 2, None, 6),
                column(202, "Name", 2, None, 2),
                column(301, "ProductKey", 3, None, 6),
                column(302, "Name", 3, Some("Product name"), 2),
                column(401, "Date", 4, None, 9),
                column(402, "Year", 4, None, 6),
            ],
        );

        views.insert(
            SystemView::Relationships,
            vec![
                relationship(1, 102, 2, 201, 1),
                relationship(1, 103, 3, 301, 2),
                relationship(1, 104, 4, 401, 1),
                // Points at a table and column the catalog no longer has.
                relationship(1, 101, 99, 999, 1),
            ],
        );

        views.insert(
            SystemView::Measures,
            vec![
                row(json!({"Name": "Total Sales", "Expression": "SUM(Sales[Amount])", "TableID": 5})),
                row(json!({"Name": "Order Count", "Expression": "COUNTROWS(Sales)", "TableID": 5})),
            ],
        );

        views.insert(SystemView::Cubes, cube_rows("2024-01-01T00:00:00", "2024-01-02T08:30:00"));

        let mut data = HashMap::new();
        data.insert(
            "Sales".to_string(),
            QueryRows::new(
                names("Sales", &["OrderKey", "CustomerKey", "ProductKey", "OrderDate", "Amount"]),
                vec![
                    vec![json!(1), json!(1), json!(10), json!("2024-01-01"), json!(120.5)],
                    vec![json!(2), json!(2), json!(11), json!("2024-01-01"), json!(75.0)],
                    vec![json!(3), json!(1), json!(11), json!("2024-01-02"), json!(12.25)],
                    vec![json!(4), json!(3), json!(10), json!("2024-01-03"), json!(300.0)],
                ],
            ),
        );
        data.insert(
            "Customer".to_string(),
            QueryRows::new(
                names("Customer", &["CustomerKey", "Name", "Region"]),
                vec![
                    vec![json!(1), json!("Contoso"), json!("West")],
                    vec![json!(2), json!("Fabrikam"), json!("East")],
                    vec![json!(3), json!("Northwind"), json!("West")],
                ],
            ),
        );
        data.insert(
            "Product".to_string(),
            QueryRows::new(
                names("Product", &["ProductKey", "Name"]),
                vec![vec![json!(10), json!("Bike")], vec![json!(11), json!("Helmet")]],
            ),
        );
        data.insert(
            "Date".to_string(),
            QueryRows::new(
                names("Date", &["Date", "Year"]),
                vec![vec![json!("2024-01-01"), json!(2024)], vec![json!("2024-01-02"), json!(2024)]],
            ),
        );

        Arc::new(Self {
            views: Mutex::new(views),
            data: Mutex::new(data),
            canned: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            reads: Mutex::new(HashMap::new()),
            queries: AtomicUsize::new(0),
        })
    }

    /// A session on this engine that is always connected.
    pub fn open(engine: &Arc<Self>) -> Arc<dyn EngineSession> {
        Arc::new(FakeSession { engine: engine.clone(), connected: Arc::new(AtomicBool::new(true)) })
    }

    /// Make every read of `view` fail.
    pub fn fail_view(&self, view: SystemView) {
        self.failing.lock().insert(view);
    }

    /// Let reads of `view` succeed again.
    pub fn heal_view(&self, view: SystemView) {
        self.failing.lock().remove(&view);
    }

    /// Report `at` as both the last schema and data update.
    pub fn set_last_update(&self, at: Option<DateTime<Utc>>) {
        let stamp = at.map(|t| t.to_rfc3339()).unwrap_or_default();
        self.views.lock().insert(SystemView::Cubes, cube_rows(&stamp, &stamp));
    }

    /// Add a data table with a single key column.
    pub fn add_table(&self, name: &str, description: &str) {
        let mut views = self.views.lock();
        let id = views
            .get(&SystemView::Tables)
            .map(|rows| rows.iter().filter_map(|r| r.get_i64("ID")).max().unwrap_or(0) + 1)
            .unwrap_or(1);
        views
            .entry(SystemView::SchemaTables)
            .or_default()
            .push(row(json!({"TABLE_NAME": name, "TABLE_SCHEMA": "Model"})));
        views
            .entry(SystemView::Tables)
            .or_default()
            .push(row(json!({"ID": id, "Name": name, "Description": description})));
        views.entry(SystemView::Columns).or_default().push(column(id * 100 + 1, "Key", id, None, 6));
        drop(views);

        self.data
            .lock()
            .insert(name.to_string(), QueryRows::new(names(name, &["Key"]), vec![vec![json!(1)]]));
    }

    /// Answer `text` with `rows`.
    pub fn respond_to(&self, text: &str, rows: QueryRows) {
        self.canned.lock().insert(text.to_string(), rows);
    }

    /// Number of times `view` was read.
    pub fn reads(&self, view: SystemView) -> usize {
        self.reads.lock().get(&view).copied().unwrap_or(0)
    }

    /// Number of DAX queries run.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn run_query(&self, text: &str) -> Result<QueryRows, CubistError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let text = text.trim();
        if let Some(rows) = self.canned.lock().get(text) {
            return Ok(rows.clone());
        }

        let (table, limit) = parse_evaluate(text)
            .ok_or_else(|| CubistError::query(format!("Syntax error in query: {text}")))?;
        let data = self.data.lock();
        let rows = data.get(&table).ok_or_else(|| {
            CubistError::query_with_details(
                format!("Table '{table}' cannot be evaluated"),
                Some("The table contains no columns".to_string()),
                Some("3241".to_string()),
            )
        })?;

        let mut result = rows.clone();
        if let Some(limit) = limit {
            result.rows.truncate(limit);
        }
        Ok(result)
    }

    fn read_view(
        &self,
        view: SystemView,
        filter: &MetadataFilter,
    ) -> Result<Vec<MetadataRow>, CubistError> {
        *self.reads.lock().entry(view).or_default() += 1;
        if self.failing.lock().contains(&view) {
            return Err(CubistError::query(format!("Failed to read {view}")));
        }
        let views = self.views.lock();
        Ok(views
            .get(&view)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }
}

fn column(id: i64, name: &str, table_id: i64, description: Option<&str>, data_type: i64) -> MetadataRow {
    row(json!({
        "ID": id,
        "ExplicitName": name,
        "TableID": table_id,
        "Description": description.unwrap_or(""),
        "ExplicitDataType": data_type,
    }))
}

fn relationship(from_table: i64, from_column: i64, to_table: i64, to_column: i64, cross: i64) -> MetadataRow {
    row(json!({
        "FromTableID": from_table,
        "FromColumnID": from_column,
        "ToTableID": to_table,
        "ToColumnID": to_column,
        "IsActive": true,
        "CrossFilteringBehavior": cross,
        "FromCardinality": 2,
        "ToCardinality": 1,
    }))
}

fn cube_rows(schema_update: &str, data_update: &str) -> Vec<MetadataRow> {
    vec![row(json!({
        "CUBE_NAME": "Model",
        "LAST_SCHEMA_UPDATE": schema_update,
        "LAST_DATA_UPDATE": data_update,
    }))]
}

fn names(table: &str, columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| format!("{table}[{c}]")).collect()
}

/// `EVALUATE 'T'` or `EVALUATE TOPN(n, 'T')`.
fn parse_evaluate(text: &str) -> Option<(String, Option<usize>)> {
    let rest = text.strip_prefix("EVALUATE")?.trim();
    if let Some(args) = rest.strip_prefix("TOPN(").and_then(|r| r.strip_suffix(')')) {
        let (limit, table) = args.split_once(',')?;
        return Some((unquote(table.trim())?, Some(limit.trim().parse().ok()?)));
    }
    Some((unquote(rest)?, None))
}

fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

struct FakeSession {
    engine: Arc<FakeEngine>,
    connected: Arc<AtomicBool>,
}

impl EngineSession for FakeSession {
    fn query(&self, text: &str) -> Result<QueryRows, CubistError> {
        self.engine.run_query(text)
    }

    fn metadata_query(
        &self,
        view: SystemView,
        filter: &MetadataFilter,
    ) -> Result<Vec<MetadataRow>, CubistError> {
        self.engine.read_view(view, filter)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Opens sessions on in-memory engines, one per catalog.
pub struct FakeFactory {
    engines: HashMap<String, Arc<FakeEngine>>,
    connect_delay: Option<Duration>,
    connects: AtomicUsize,
    failure: Mutex<Option<String>>,
    sessions: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeFactory {
    pub fn new(engines: Vec<(&str, Arc<FakeEngine>)>) -> Self {
        Self {
            engines: engines.into_iter().map(|(catalog, e)| (catalog.to_string(), e)).collect(),
            connect_delay: None,
            connects: AtomicUsize::new(0),
            failure: Mutex::new(None),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn single(catalog: &str, engine: Arc<FakeEngine>) -> Self {
        Self::new(vec![(catalog, engine)])
    }

    /// Block every connect for `delay`.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Reject further connects with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    /// Accept connects again.
    pub fn succeed(&self) {
        *self.failure.lock() = None;
    }

    /// Mark every session opened so far as disconnected.
    pub fn disconnect_all(&self) {
        for flag in self.sessions.lock().iter() {
            flag.store(false, Ordering::SeqCst);
        }
    }

    /// Engine serving `catalog`.
    pub fn engine(&self, catalog: &str) -> Arc<FakeEngine> {
        self.engines.get(catalog).cloned().unwrap_or_else(|| panic!("no engine for {catalog}"))
    }
}

impl EngineSessionFactory for FakeFactory {
    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn EngineSession>, CubistError> {
        if let Some(delay) = self.connect_delay {
            std::thread::sleep(delay);
        }
        if let Some(message) = self.failure.lock().clone() {
            return Err(CubistError::connection(message));
        }
        let catalog = &descriptor.identity.catalog;
        let engine = self.engines.get(catalog).cloned().ok_or_else(|| {
            CubistError::connection(format!("Database '{catalog}' was not found"))
        })?;

        let connected = Arc::new(AtomicBool::new(true));
        self.sessions.lock().push(connected.clone());
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession { engine, connected }))
    }
}

/// Metadata source whose batch reads, or reads of chosen tables, fail.
pub struct FlakySource {
    inner: SessionMetadataSource,
    fail_batches: bool,
    failing_tables: HashSet<String>,
}

impl FlakySource {
    pub fn failing_batches(inner: SessionMetadataSource) -> Self {
        Self { inner, fail_batches: true, failing_tables: HashSet::new() }
    }

    pub fn failing_table(mut self, table: &str) -> Self {
        self.failing_tables.insert(table.to_string());
        self
    }

    fn check_batch(&self) -> Result<(), CubistError> {
        if self.fail_batches {
            return Err(CubistError::query("Batch read rejected"));
        }
        Ok(())
    }

    fn check_table(&self, table: &str) -> Result<(), CubistError> {
        if self.failing_tables.contains(table) {
            return Err(CubistError::query(format!("Read of '{table}' rejected")));
        }
        Ok(())
    }
}

impl ModelMetadataSource for FlakySource {
    fn table_names(&self) -> Result<Vec<String>, CubistError> {
        self.inner.table_names()
    }

    fn table_descriptions(
        &self,
        tables: &[String],
    ) -> Result<HashMap<String, String>, CubistError> {
        self.check_batch()?;
        self.inner.table_descriptions(tables)
    }

    fn table_description(&self, table: &str) -> Result<Option<String>, CubistError> {
        self.check_table(table)?;
        self.inner.table_description(table)
    }

    fn relationships(
        &self,
        tables: &[String],
    ) -> Result<HashMap<String, Vec<RelationshipView>>, CubistError> {
        self.check_batch()?;
        self.inner.relationships(tables)
    }

    fn table_relationships(&self, table: &str) -> Result<Vec<RelationshipView>, CubistError> {
        self.check_table(table)?;
        self.inner.table_relationships(table)
    }

    fn column_descriptions(&self, table: &str) -> Result<Vec<ColumnDescription>, CubistError> {
        self.inner.column_descriptions(table)
    }

    fn probe_columns(&self, table: &str) -> Result<Vec<String>, CubistError> {
        self.inner.probe_columns(table)
    }

    fn measures(&self, table: &str) -> Result<Option<Vec<MeasureInfo>>, CubistError> {
        self.inner.measures(table)
    }
}
