//! 表结构推导

use crate::error::SchemaError;
use labpoll_types::{FieldKind, Reading};
use std::collections::HashSet;
use std::fmt;

/// 每张测量表末尾的固定列
pub const FIXED_COLUMNS: [&str; 5] = ["timestamp", "error", "network_error", "ip_address", "port"];

/// 存储列类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Text,
    Integer,
    Blob,
    Real,
}

impl ColumnType {
    /// 字段种类到列类型的固定映射
    pub fn for_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text
            | FieldKind::Char
            | FieldKind::Uuid
            | FieldKind::Decimal
            | FieldKind::Date
            | FieldKind::Time
            | FieldKind::DateTime => ColumnType::Text,
            FieldKind::Bool
            | FieldKind::I8
            | FieldKind::I16
            | FieldKind::I32
            | FieldKind::I64
            | FieldKind::U8
            | FieldKind::U16
            | FieldKind::U32 => ColumnType::Integer,
            FieldKind::Bytes => ColumnType::Blob,
            FieldKind::F32 | FieldKind::F64 => ColumnType::Real,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Blob => "BLOB",
            ColumnType::Real => "REAL",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

/// 一种测量类型对应的表结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    /// 设备字段列，顺序与字段描述表一致
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// 从测量类型的字段描述表推导
    pub fn derive<R: Reading>() -> Result<Self, SchemaError> {
        Self::new(
            R::TYPE_NAME,
            R::fields().iter().map(|field| (field.name, field.kind)),
        )
    }

    pub fn new<'a>(
        type_name: &str,
        fields: impl IntoIterator<Item = (&'a str, FieldKind)>,
    ) -> Result<Self, SchemaError> {
        let table = table_name_for(type_name);
        if !is_identifier(&table) {
            return Err(SchemaError::InvalidName(table));
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for (name, kind) in fields {
            if !is_identifier(name) {
                return Err(SchemaError::InvalidName(name.to_string()));
            }
            let lowered = name.to_ascii_lowercase();
            if FIXED_COLUMNS.contains(&lowered.as_str()) {
                return Err(SchemaError::ReservedName(name.to_string()));
            }
            // SQLite 列名大小写不敏感
            if !seen.insert(lowered) {
                return Err(SchemaError::DuplicateName(name.to_string()));
            }
            columns.push(ColumnDef {
                name: name.to_string(),
                column_type: ColumnType::for_kind(kind),
            });
        }

        if columns.is_empty() {
            return Err(SchemaError::NoFields(type_name.to_string()));
        }

        Ok(Self { table, columns })
    }

    pub fn create_table_sql(&self) -> String {
        let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", self.table);
        for column in &self.columns {
            sql.push_str(&format!("    {} {},\n", column.name, column.column_type));
        }
        sql.push_str(
            "    timestamp TEXT NOT NULL,
    error INTEGER NOT NULL,
    network_error INTEGER NOT NULL,
    ip_address TEXT NOT NULL,
    port INTEGER NOT NULL,
    PRIMARY KEY (timestamp, ip_address, port),
    FOREIGN KEY (ip_address, port) REFERENCES devices (ip_address, port)
        ON DELETE CASCADE ON UPDATE CASCADE
)",
        );
        sql
    }

    /// 所有列名（设备字段在前，固定列在后）
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        names.extend(FIXED_COLUMNS);
        names
    }

    pub fn insert_sql(&self) -> String {
        let names = self.column_names();
        let placeholders = vec!["?"; names.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            names.join(", "),
            placeholders
        )
    }

    pub fn select_range_sql(&self) -> String {
        let fields: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let mut projection = fields.join(", ");
        if !projection.is_empty() {
            projection.push_str(", ");
        }
        format!(
            "SELECT {}timestamp, error, network_error FROM {} \
             WHERE ip_address = ? AND port = ? AND timestamp >= ? AND timestamp <= ? \
             ORDER BY timestamp",
            projection, self.table
        )
    }
}

/// 测量类型名到表名：snake_case 加 `s`
///
/// `SmartProMeasurement` → `smart_pro_measurements`
pub fn table_name_for(type_name: &str) -> String {
    let chars: Vec<char> = type_name.chars().collect();
    let mut out = String::with_capacity(type_name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.map_or(false, |n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }

    out.push('s');
    out
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use labpoll_types::{ExampleReading, SmartProReading};

    #[test]
    fn test_table_names() {
        assert_eq!(table_name_for("SmartProMeasurement"), "smart_pro_measurements");
        assert_eq!(table_name_for("ExampleMeasurement"), "example_measurements");
        assert_eq!(table_name_for("HTTPProbe"), "http_probes");
        assert_eq!(table_name_for("Sensor2Reading"), "sensor2_readings");
    }

    #[test]
    fn test_derive_smart_pro() {
        let schema = TableSchema::derive::<SmartProReading>().unwrap();
        assert_eq!(schema.table, "smart_pro_measurements");
        assert_eq!(
            schema.columns,
            vec![
                ColumnDef {
                    name: "is_running".into(),
                    column_type: ColumnType::Integer
                },
                ColumnDef {
                    name: "temperature".into(),
                    column_type: ColumnType::Integer
                },
            ]
        );
        assert_eq!(
            schema.insert_sql(),
            "INSERT INTO smart_pro_measurements (is_running, temperature, timestamp, error, \
             network_error, ip_address, port) VALUES (?, ?, ?, ?, ?, ?, ?)"
        );
    }

    #[test]
    fn test_create_table_sql_has_fixed_tail() {
        let schema = TableSchema::derive::<ExampleReading>().unwrap();
        let sql = schema.create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS example_measurements"));
        assert!(sql.contains("distance_travelled INTEGER"));
        assert!(sql.contains("PRIMARY KEY (timestamp, ip_address, port)"));
        assert!(sql.contains("ON DELETE CASCADE ON UPDATE CASCADE"));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ColumnType::for_kind(FieldKind::Uuid), ColumnType::Text);
        assert_eq!(ColumnType::for_kind(FieldKind::DateTime), ColumnType::Text);
        assert_eq!(ColumnType::for_kind(FieldKind::Bool), ColumnType::Integer);
        assert_eq!(ColumnType::for_kind(FieldKind::U32), ColumnType::Integer);
        assert_eq!(ColumnType::for_kind(FieldKind::Bytes), ColumnType::Blob);
        assert_eq!(ColumnType::for_kind(FieldKind::F32), ColumnType::Real);
    }

    #[test]
    fn test_schema_errors() {
        assert_eq!(
            TableSchema::new("EmptyMeasurement", []),
            Err(SchemaError::NoFields("EmptyMeasurement".into()))
        );
        assert_eq!(
            TableSchema::new("BadMeasurement", [("drop table", FieldKind::Text)]),
            Err(SchemaError::InvalidName("drop table".into()))
        );
        assert_eq!(
            TableSchema::new("BadMeasurement", [("1st", FieldKind::I32)]),
            Err(SchemaError::InvalidName("1st".into()))
        );
        assert_eq!(
            TableSchema::new(
                "BadMeasurement",
                [("speed", FieldKind::I32), ("Speed", FieldKind::F64)]
            ),
            Err(SchemaError::DuplicateName("Speed".into()))
        );
        assert_eq!(
            TableSchema::new("BadMeasurement", [("timestamp", FieldKind::DateTime)]),
            Err(SchemaError::ReservedName("timestamp".into()))
        );
        assert_eq!(
            TableSchema::new("BadMeasurement", [("Port", FieldKind::U16)]),
            Err(SchemaError::ReservedName("Port".into()))
        );
    }
}
