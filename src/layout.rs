use dashmap::DashMap;

use crate::model::{Table, TableId};
use crate::store::LayoutResolver;

/// Tables of a venue across all zones.
#[derive(Default)]
pub struct Layout {
    tables: DashMap<TableId, Table>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: Table) {
        self.tables.insert(table.id.clone(), table);
    }

    pub fn get(&self, id: &TableId) -> Option<Table> {
        self.tables.get(id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// All tables ordered by id.
    pub fn tables(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = self.tables.iter().map(|e| e.value().clone()).collect();
        tables.sort_by(|a, b| a.id.cmp(&b.id));
        tables
    }

    pub fn zone_tables(&self, zone_id: &str) -> Vec<Table> {
        let mut tables = self.tables();
        tables.retain(|t| t.zone_id == zone_id);
        tables
    }

    /// Smallest id among the tables matching `pred`, so duplicate names
    /// across zones resolve the same way every time.
    fn first_match(&self, pred: impl Fn(&Table) -> bool) -> Option<TableId> {
        self.tables
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.key().clone())
            .min()
    }
}

impl LayoutResolver for Layout {
    /// Exact id first, then display name, then table number.
    fn resolve_table(&self, name_or_number: &str) -> Option<TableId> {
        let text = name_or_number.trim();
        if text.is_empty() {
            return None;
        }
        let id = TableId::new(text);
        if self.tables.contains_key(&id) {
            return Some(id);
        }
        if let Some(id) = self.first_match(|t| t.name.as_deref().map(str::trim) == Some(text)) {
            return Some(id);
        }
        let number: u32 = text.parse().ok()?;
        self.first_match(|t| t.number == number)
    }
}
