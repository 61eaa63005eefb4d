//! Engine-agnostic select queries over the index tables.
//!
//! A [`SelectQuery`] only describes what to fetch: equality and membership
//! predicates (always conjunctive), ordering, a row limit and an optional
//! `DISTINCT` projection. Each engine renders it into its own SQL dialect, so
//! the filter builder and the label resolver never depend on one engine.

use crate::error::{MetadataError, MetadataResult};

/// Index tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    Frame,
    FrameLabel,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::FrameLabel => "frame_label",
        }
    }

    /// Columns selected for full-row queries, in model field order.
    pub fn row_columns(&self) -> &'static [Column] {
        match self {
            Self::Frame => &[
                Column::Id,
                Column::Node,
                Column::FetchedAt,
                Column::WallClockSlot,
                Column::WallClockEpoch,
            ],
            Self::FrameLabel => &[Column::FrameId, Column::Name],
        }
    }
}

/// Columns of the index tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    Id,
    Node,
    FetchedAt,
    WallClockSlot,
    WallClockEpoch,
    FrameId,
    Name,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Node => "node",
            Self::FetchedAt => "fetched_at",
            Self::WallClockSlot => "wall_clock_slot",
            Self::WallClockEpoch => "wall_clock_epoch",
            Self::FrameId => "frame_id",
            Self::Name => "name",
        }
    }

    pub fn table(&self) -> Table {
        match self {
            Self::FrameId | Self::Name => Table::FrameLabel,
            _ => Table::Frame,
        }
    }

    /// Whether the column holds text, which engines may collate differently.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Id | Self::Node | Self::FrameId | Self::Name)
    }
}

/// A single bound value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Int(i64),
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// A homogeneous list of bound values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Values {
    Text(Vec<String>),
    Int(Vec<i64>),
}

impl Values {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(values) => values.is_empty(),
            Self::Int(values) => values.is_empty(),
        }
    }
}

/// A filter condition on one column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// `column = value`
    Eq(Column, Value),
    /// `column IN (values)`; an empty list matches nothing.
    In(Column, Values),
}

impl Predicate {
    pub fn column(&self) -> Column {
        match self {
            Self::Eq(column, _) | Self::In(column, _) => *column,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// What a query returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    /// Every column of the table, see [`Table::row_columns`].
    Rows,
    /// The distinct values of one column.
    Distinct(Column),
}

/// Description of a select over one index table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectQuery {
    table: Table,
    projection: Projection,
    predicates: Vec<Predicate>,
    order_by: Vec<(Column, Direction)>,
    limit: Option<u32>,
}

impl SelectQuery {
    /// Select full rows from `table`.
    pub fn from(table: Table) -> Self {
        Self {
            table,
            projection: Projection::Rows,
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Project the distinct values of `column` instead of full rows.
    pub fn distinct(&mut self, column: Column) -> &mut Self {
        self.projection = Projection::Distinct(column);
        self
    }

    pub fn filter_eq(&mut self, column: Column, value: impl Into<Value>) -> &mut Self {
        self.predicates.push(Predicate::Eq(column, value.into()));
        self
    }

    pub fn filter_in(&mut self, column: Column, values: Values) -> &mut Self {
        self.predicates.push(Predicate::In(column, values));
        self
    }

    /// Add an already-built predicate.
    pub fn filter(&mut self, predicate: Predicate) -> &mut Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(&mut self, column: Column, direction: Direction) -> &mut Self {
        self.order_by.push((column, direction));
        self
    }

    pub fn limit(&mut self, limit: u32) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn ordering(&self) -> &[(Column, Direction)] {
        &self.order_by
    }

    pub fn row_limit(&self) -> Option<u32> {
        self.limit
    }

    /// Check that every referenced column belongs to the table and that the
    /// query has the projection the caller expects.
    pub fn check(&self, table: Table, distinct: bool) -> MetadataResult<()> {
        if self.table != table {
            return Err(MetadataError::Internal(format!(
                "query over {} used where {} was expected",
                self.table.as_str(),
                table.as_str()
            )));
        }
        match (self.projection, distinct) {
            (Projection::Rows, false) | (Projection::Distinct(_), true) => {}
            (projection, _) => {
                return Err(MetadataError::Internal(format!(
                    "unexpected projection {projection:?}"
                )));
            }
        }

        let mut columns = self
            .predicates
            .iter()
            .map(Predicate::column)
            .chain(self.order_by.iter().map(|(column, _)| *column));
        if let Some(column) = columns.find(|column| column.table() != self.table) {
            return Err(MetadataError::Internal(format!(
                "column {} does not belong to {}",
                column.as_str(),
                self.table.as_str()
            )));
        }

        if let Projection::Distinct(column) = self.projection {
            if column.table() != self.table {
                return Err(MetadataError::Internal(format!(
                    "column {} does not belong to {}",
                    column.as_str(),
                    self.table.as_str()
                )));
            }
            if self.order_by.iter().any(|(ordered, _)| *ordered != column) {
                return Err(MetadataError::Internal(
                    "distinct queries may only order by the projected column".to_string(),
                ));
            }
        }

        Ok(())
    }
}
