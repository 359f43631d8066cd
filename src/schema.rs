//! Declarative table definitions.
//!
//! Each model declares its table as data (`Table`); the `Metadata` registry
//! collects the declarations and renders `CREATE TABLE IF NOT EXISTS` DDL
//! in declaration order, so parents must be declared before children.

use tokio_postgres::Client;
use tracing::{info, warn};

use crate::error::ApiError;

/// PostgreSQL column types used by the blog tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Serial,
    Integer,
    Varchar(u32),
    Timestamp,
}

impl ColumnType {
    fn sql(&self) -> String {
        match self {
            ColumnType::Serial => "SERIAL".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Varchar(len) => format!("VARCHAR({})", len),
            ColumnType::Timestamp => "TIMESTAMPTZ".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    pub fn new(name: &'static str, ty: ColumnType) -> Self {
        Column {
            name,
            ty,
            primary_key: false,
            nullable: true,
            unique: false,
        }
    }

    pub fn primary_key(name: &'static str) -> Self {
        Column {
            primary_key: true,
            nullable: false,
            ..Column::new(name, ColumnType::Serial)
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.ty.sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        sql
    }
}

/// What happens to child rows when the referenced parent row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    NoAction,
    Cascade,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references_table: &'static str,
    pub references_column: &'static str,
    pub on_delete: OnDelete,
}

impl ForeignKey {
    pub fn new(column: &'static str, references_table: &'static str) -> Self {
        ForeignKey {
            column,
            references_table,
            references_column: "id",
            on_delete: OnDelete::NoAction,
        }
    }

    pub fn on_delete(mut self, action: OnDelete) -> Self {
        self.on_delete = action;
        self
    }

    fn sql(&self) -> String {
        let mut sql = format!(
            "FOREIGN KEY ({}) REFERENCES {}({})",
            self.column, self.references_table, self.references_column
        );
        match self.on_delete {
            OnDelete::NoAction => {}
            OnDelete::Cascade => sql.push_str(" ON DELETE CASCADE"),
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
    /// Extra statements run after the table exists (indexes).
    pub indexes: Vec<(&'static str, &'static str)>,
}

impl Table {
    pub fn new(name: &'static str) -> Self {
        Table {
            name,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Index `name` over `column`.
    pub fn index(mut self, name: &'static str, column: &'static str) -> Self {
        self.indexes.push((name, column));
        self
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Tables this one references, in declaration order.
    pub fn dependencies(&self) -> Vec<&'static str> {
        let mut deps: Vec<&'static str> = Vec::new();
        for fk in &self.foreign_keys {
            if fk.references_table != self.name && !deps.contains(&fk.references_table) {
                deps.push(fk.references_table);
            }
        }
        deps
    }

    pub fn create_sql(&self) -> String {
        let definitions: Vec<String> = self
            .columns
            .iter()
            .map(Column::sql)
            .chain(self.foreign_keys.iter().map(ForeignKey::sql))
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            definitions.join(",\n    ")
        )
    }

    pub fn index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|(name, column)| {
                format!("CREATE INDEX IF NOT EXISTS {} ON {}({})", name, self.name, column)
            })
            .collect()
    }
}

/// Ordered registry of table declarations.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    tables: Vec<Table>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `table`. A second declaration under the same name replaces
    /// the first in place and the shadowed definition is returned.
    pub fn declare(&mut self, table: Table) -> Option<Table> {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => {
                warn!(
                    table = table.name,
                    "Table declared twice; the later declaration replaces the earlier one"
                );
                Some(std::mem::replace(existing, table))
            }
            None => {
                self.tables.push(table);
                None
            }
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Check every foreign key points at a table declared earlier.
    pub fn validate(&self) -> Result<(), ApiError> {
        for (position, table) in self.tables.iter().enumerate() {
            for dep in table.dependencies() {
                let declared_before = self.tables[..position].iter().any(|t| t.name == dep);
                if !declared_before {
                    return Err(ApiError::Database(format!(
                        "Table {} references {} which is not declared before it",
                        table.name, dep
                    )));
                }
            }
        }
        Ok(())
    }

    /// All DDL statements in execution order.
    pub fn create_statements(&self) -> Vec<String> {
        let mut statements = Vec::new();
        for table in &self.tables {
            statements.push(table.create_sql());
            statements.extend(table.index_sql());
        }
        statements
    }

    /// Create every declared table that does not exist yet.
    pub async fn create_all(&self, client: &Client) -> Result<(), ApiError> {
        self.validate()?;

        for statement in self.create_statements() {
            client.batch_execute(&statement).await?;
        }
        info!("Created {} tables if absent", self.tables.len());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> Table {
        Table::new("parents")
            .column(Column::primary_key("id"))
            .column(Column::new("name", ColumnType::Varchar(40)).not_null().unique())
    }

    fn child() -> Table {
        Table::new("children")
            .column(Column::primary_key("id"))
            .column(Column::new("parent_id", ColumnType::Integer))
            .foreign_key(ForeignKey::new("parent_id", "parents").on_delete(OnDelete::Cascade))
            .index("idx_children_parent_id", "parent_id")
    }

    #[test]
    fn test_create_sql() {
        let sql = child().create_sql();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS children (\n    id SERIAL PRIMARY KEY,\n    parent_id INTEGER,\n    FOREIGN KEY (parent_id) REFERENCES parents(id) ON DELETE CASCADE\n)"
        );
    }

    #[test]
    fn test_column_constraints() {
        let sql = parent().create_sql();
        assert!(sql.contains("name VARCHAR(40) NOT NULL UNIQUE"));
    }

    #[test]
    fn test_index_sql() {
        assert_eq!(
            child().index_sql(),
            vec!["CREATE INDEX IF NOT EXISTS idx_children_parent_id ON children(parent_id)".to_string()]
        );
    }

    #[test]
    fn test_redeclaration_shadows_previous_definition() {
        let first = Table::new("posts")
            .column(Column::primary_key("id"))
            .column(Column::new("title", ColumnType::Varchar(100)).not_null())
            .column(Column::new("vote_count", ColumnType::Integer));
        let second = Table::new("posts")
            .column(Column::primary_key("id"))
            .column(Column::new("title", ColumnType::Varchar(100)).not_null())
            .column(Column::new("post_url", ColumnType::Varchar(100)).not_null());

        let mut metadata = Metadata::new();
        assert!(metadata.declare(first.clone()).is_none());
        let shadowed = metadata.declare(second.clone());

        assert_eq!(shadowed, Some(first));
        assert_eq!(metadata.tables().len(), 1);

        let active = metadata.table("posts").unwrap();
        assert_eq!(active, &second);
        assert!(active.has_column("post_url"));
        assert!(!active.has_column("vote_count"));
    }

    #[test]
    fn test_redeclaration_keeps_position() {
        let mut metadata = Metadata::new();
        metadata.declare(parent());
        metadata.declare(child());
        metadata.declare(parent().column(Column::new("extra", ColumnType::Integer)));

        let names: Vec<&str> = metadata.tables().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["parents", "children"]);
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_forward_references() {
        let mut metadata = Metadata::new();
        metadata.declare(child());
        metadata.declare(parent());

        assert!(metadata.validate().is_err());
    }

    #[test]
    fn test_create_statements_order() {
        let mut metadata = Metadata::new();
        metadata.declare(parent());
        metadata.declare(child());

        let statements = metadata.create_statements();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("TABLE IF NOT EXISTS parents"));
        assert!(statements[1].contains("TABLE IF NOT EXISTS children"));
        assert!(statements[2].starts_with("CREATE INDEX"));
    }
}
