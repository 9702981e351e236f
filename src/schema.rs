//! Logical schema of the pricing/quality store.
//!
//! The same declarations feed the translation prompt and the bootstrap DDL,
//! so the model never sees a column the store does not have.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    PrimaryKey,
}

impl ColumnRole {
    fn as_sql(self) -> &'static str {
        match self {
            ColumnRole::PrimaryKey => "PRIMARY KEY",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDecl {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub role: Option<ColumnRole>,
}

impl ColumnDecl {
    const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            role: None,
        }
    }

    const fn primary_key(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            role: Some(ColumnRole::PrimaryKey),
        }
    }
}

impl fmt::Display for ColumnDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.sql_type)?;
        if let Some(role) = self.role {
            write!(f, " {}", role.as_sql())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableDecl {
    pub name: &'static str,
    pub columns: &'static [ColumnDecl],
}

impl TableDecl {
    pub fn create_table_sql(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({cols})", self.name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaDescriptor {
    pub tables: &'static [TableDecl],
}

/// The three tables the pricing/quality API answers questions about.
pub static PROVIDER_SCHEMA: SchemaDescriptor = SchemaDescriptor {
    tables: &[
        TableDecl {
            name: "provider",
            columns: &[
                ColumnDecl::primary_key("provider_id", "INT"),
                ColumnDecl::new("provider_name", "VARCHAR(255)"),
                ColumnDecl::new("provider_city", "VARCHAR(255)"),
                ColumnDecl::new("provider_state", "VARCHAR(2)"),
                ColumnDecl::new("provider_zip_code", "VARCHAR(20)"),
                ColumnDecl::new("provider_status", "VARCHAR(20)"),
            ],
        },
        TableDecl {
            name: "provider_pricing",
            columns: &[
                ColumnDecl::new("provider_id", "INT"),
                ColumnDecl::new("ms_drg_definition", "VARCHAR(1000)"),
                ColumnDecl::new("total_discharges", "INT"),
                ColumnDecl::new("averaged_covered_charges", "INT"),
                ColumnDecl::new("average_total_payments", "INT"),
                ColumnDecl::new("average_medicare_payments", "INT"),
                ColumnDecl::new("provider_pricing_year", "INT"),
            ],
        },
        TableDecl {
            name: "provider_rating",
            columns: &[
                ColumnDecl::new("provider_id", "INT"),
                ColumnDecl::new("provider_overall_rating", "INT"),
                ColumnDecl::new("provider_star_rating", "INT"),
                ColumnDecl::new("provider_rating_year", "INT"),
            ],
        },
    ],
};

impl SchemaDescriptor {
    /// Prompt form: `"\nTable: <name>\n  - <col decl>\n"` per table, in declared order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for table in self.tables {
            out.push_str(&format!("\nTable: {}\n", table.name));
            for col in table.columns {
                out.push_str(&format!("  - {col}\n"));
            }
        }
        out
    }

    pub fn table(&self, name: &str) -> Option<&TableDecl> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn create_table_statements(&self) -> Vec<String> {
        self.tables.iter().map(TableDecl::create_table_sql).collect()
    }
}
