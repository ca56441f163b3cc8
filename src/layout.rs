//! Layout registry: which tables exist, what their columns are, and which of them the
//! row-by-row fallback knows how to fill.
//!
//! The registry is built once at startup (built-in DNE tables, optionally merged with a JSON
//! layout file) and is read-only for the rest of the run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};
use crate::store::InsertTemplate;
use crate::types::{Column, Layout};

/// Per-table capability: layout, optional region column and manual-import support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name (upper case).
    pub name: String,
    /// Ordered column layout.
    pub columns: Layout,
    /// Column that receives the region code of `<FAMILY>_<REGION>` files.
    #[serde(default)]
    pub region_column: Option<String>,
    /// Whether the row-by-row fallback may insert into this table.
    #[serde(default = "default_manual_import")]
    pub manual_import: bool,
}

fn default_manual_import() -> bool {
    true
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            columns: Layout::new(columns),
            region_column: None,
            manual_import: true,
        }
    }

    /// Accept `<NAME>_<REGION>` files, storing the region in `column`.
    pub fn with_region_column(mut self, column: impl Into<String>) -> Self {
        self.region_column = Some(column.into());
        self
    }

    /// Mark the table as bulk-only: the fallback path reports it as unsupported.
    pub fn bulk_only(mut self) -> Self {
        self.manual_import = false;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.columns
    }

    /// Insert template for the fallback path, or `None` when the table is bulk-only.
    pub fn insert_template(&self) -> Option<InsertTemplate<'_>> {
        self.manual_import.then(|| InsertTemplate {
            table: &self.name,
            layout: &self.columns,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("table name is empty".to_string());
        }
        if self.columns.is_empty() {
            return Err(format!("table '{}' has no columns", self.name));
        }
        if let Some(dup) = self.columns.duplicate_column() {
            return Err(format!("table '{}' declares column '{dup}' twice", self.name));
        }
        if let Some(region) = &self.region_column {
            if self.columns.index_of(region).is_none() {
                return Err(format!(
                    "table '{}' names region column '{region}' which is not in its layout",
                    self.name
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LayoutDocument {
    tables: Vec<TableDef>,
}

/// Table name → [`TableDef`] mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutRegistry {
    tables: BTreeMap<String, TableDef>,
}

impl LayoutRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in layouts of the DNE delimited export.
    ///
    /// `LOG_LOGRADOURO` is the unified street table for every `LOG_LOGRADOURO_<UF>.TXT` shard;
    /// its `UF` column is filled from the file name. The `LOG_FAIXA_*` range tables are
    /// bulk-only.
    pub fn dne() -> Self {
        let tables = vec![
            TableDef::new(
                "ECT_PAIS",
                vec![
                    Column::integer("PAIS_CODIGO"),
                    Column::text("PAIS_NOME"),
                    Column::text("SIGLA"),
                ],
            ),
            TableDef::new(
                "LOG_BAIRRO",
                vec![
                    Column::integer("BAIRRO_COD"),
                    Column::code("UFE_SG", 2),
                    Column::integer("LOC_NU"),
                    Column::text("BAIRRO_NO"),
                ],
            ),
            TableDef::new(
                "LOG_CPC",
                vec![
                    Column::integer("CPC_NU"),
                    Column::code("UFE_SG", 2),
                    Column::integer("LOC_NU"),
                    Column::integer("LOG_NU"),
                    Column::text("CTC_NO"),
                    Column::code("CEP", 8),
                ],
            ),
            TableDef::new(
                "LOG_FAIXA_BAIRRO",
                vec![
                    Column::integer("BAIRRO_NU"),
                    Column::code("CEP_INI", 8),
                    Column::code("CEP_FIM", 8),
                ],
            )
            .bulk_only(),
            TableDef::new(
                "LOG_FAIXA_CPC",
                vec![
                    Column::integer("CPC_NU"),
                    Column::code("CEP_INI", 8),
                    Column::code("CEP_FIM", 8),
                ],
            )
            .bulk_only(),
            TableDef::new(
                "LOG_FAIXA_LOCALIDADE",
                vec![
                    Column::integer("LOC_NU"),
                    Column::code("CEP_INI", 8),
                    Column::code("CEP_FIM", 8),
                ],
            )
            .bulk_only(),
            TableDef::new(
                "LOG_FAIXA_UF",
                vec![
                    Column::code("UFE_SG", 2),
                    Column::code("CEP_INI", 8),
                    Column::code("CEP_FIM", 8),
                ],
            )
            .bulk_only(),
            TableDef::new(
                "LOG_FAIXA_UOP",
                vec![
                    Column::integer("UOP_NU"),
                    Column::code("CEP_INI", 8),
                    Column::code("CEP_FIM", 8),
                ],
            )
            .bulk_only(),
            TableDef::new(
                "LOG_GRANDE_USUARIO",
                vec![
                    Column::integer("GU_NU"),
                    Column::code("UFE_SG", 2),
                    Column::integer("LOC_NU"),
                    Column::integer("LOG_NU"),
                    Column::text("GU_NO"),
                    Column::code("CEP", 8),
                ],
            ),
            TableDef::new(
                "LOG_LOCALIDADE",
                vec![
                    Column::integer("LOC_NU"),
                    Column::code("UFE_SG", 2),
                    Column::text("LOC_NO"),
                    Column::code("CEP", 8),
                ],
            ),
            TableDef::new(
                "LOG_LOGRADOURO",
                vec![
                    Column::integer("LOG_NU"),
                    Column::code("UFE_SG", 2),
                    Column::integer("LOC_NU"),
                    Column::integer("BAIRRO_NU_INI"),
                    Column::integer("BAIRRO_NU_FIM"),
                    Column::text("LOG_NO"),
                    Column::code("CEP", 8),
                    Column::code("UF", 2),
                ],
            )
            .with_region_column("UF"),
        ];

        let mut registry = Self::new();
        for table in tables {
            registry.insert(table);
        }
        registry
    }

    /// Parse a JSON layout document: `{"tables": [{"name": ..., "columns": [...], ...}]}`.
    pub fn from_json_str(json: &str) -> IngestionResult<Self> {
        let doc: LayoutDocument =
            serde_json::from_str(json).map_err(|e| IngestionError::Layout {
                message: e.to_string(),
            })?;

        let mut registry = Self::new();
        for mut table in doc.tables {
            table.name = table.name.trim().to_ascii_uppercase();
            table
                .validate()
                .map_err(|message| IngestionError::Layout { message })?;
            if registry.get(&table.name).is_some() {
                return Err(IngestionError::Layout {
                    message: format!("table '{}' is defined twice", table.name),
                });
            }
            registry.insert(table);
        }
        Ok(registry)
    }

    /// Load a JSON layout document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> IngestionResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| IngestionError::Layout {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    /// Add or replace a table definition.
    pub fn insert(&mut self, table: TableDef) -> Option<TableDef> {
        self.tables.insert(table.name.clone(), table)
    }

    /// Merge `other` into `self`; tables in `other` replace same-named tables.
    pub fn merge(mut self, other: LayoutRegistry) -> Self {
        self.tables.extend(other.tables);
        self
    }

    /// Case-insensitive lookup.
    pub fn get(&self, table: &str) -> Option<&TableDef> {
        match self.tables.get(table) {
            Some(def) => Some(def),
            None => self.tables.get(&table.to_ascii_uppercase()),
        }
    }

    /// Tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    #[test]
    fn dne_registry_marks_range_tables_bulk_only() {
        let registry = LayoutRegistry::dne();
        assert!(registry.get("LOG_FAIXA_UF").unwrap().insert_template().is_none());
        assert!(registry.get("log_localidade").unwrap().insert_template().is_some());
        let street = registry.get("LOG_LOGRADOURO").unwrap();
        assert_eq!(street.region_column.as_deref(), Some("UF"));
        assert_eq!(street.layout().len(), 8);
    }

    #[test]
    fn json_document_is_validated() {
        let err = LayoutRegistry::from_json_str(
            r#"{"tables":[{"name":"t","columns":[{"name":"A","type":"integer"}],"region_column":"UF"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("region column 'UF'"));

        let registry = LayoutRegistry::from_json_str(
            r#"{"tables":[{"name":"log_x","columns":[{"name":"A","type":"integer"},{"name":"B","type":"code","width":2}],"manual_import":false}]}"#,
        )
        .unwrap();
        let table = registry.get("LOG_X").unwrap();
        assert!(!table.manual_import);
        assert_eq!(table.columns.columns[1].column_type, ColumnType::Code { width: 2 });
    }

    #[test]
    fn merge_replaces_same_named_tables() {
        let custom = LayoutRegistry::from_json_str(
            r#"{"tables":[{"name":"LOG_LOCALIDADE","columns":[{"name":"LOC_NU","type":"integer"}]}]}"#,
        )
        .unwrap();
        let merged = LayoutRegistry::dne().merge(custom);
        assert_eq!(merged.get("LOG_LOCALIDADE").unwrap().layout().len(), 1);
        assert_eq!(merged.len(), LayoutRegistry::dne().len());
    }
}
