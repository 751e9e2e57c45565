use std::collections::BTreeSet;

use tracing::debug;

use crate::domain::{AliasMap, CanonicalField, CategorySpec};
use crate::table::Table;

#[derive(Debug, Clone)]
pub struct Harmonized {
    pub table: Table,
    pub unresolved: Vec<CanonicalField>,
}

impl Harmonized {
    pub fn resolve_with(&mut self, field: CanonicalField, value: &str) {
        let values = vec![value.to_string(); self.table.len()];
        self.table.set_column(field.column(), values);
        self.unresolved.retain(|candidate| *candidate != field);
    }
}

pub fn harmonize(raw: Table, aliases: &AliasMap, category: &CategorySpec) -> Harmonized {
    let mut table = raw;

    let renames = table
        .headers()
        .iter()
        .filter_map(|header| {
            let source = header.trim();
            aliases
                .get(source)
                .map(|field| (header.clone(), field.column().to_string()))
        })
        .collect::<Vec<_>>();
    for (source, target) in renames {
        if table.has_column(&target) {
            debug!(category = %category.name, source = %source, target = %target, "alias target already present, keeping source name");
            continue;
        }
        table.rename_column(&source, &target);
    }

    for field in CanonicalField::ALL {
        if field.is_category_extra() && !category.keeps_extra(field) {
            table.drop_column(field.column());
        }
    }

    let present = table
        .headers()
        .iter()
        .filter_map(|header| CanonicalField::from_column(header))
        .collect::<BTreeSet<_>>();
    let unresolved = CanonicalField::ALL
        .into_iter()
        .filter(|field| !present.contains(field))
        .filter(|field| !field.is_category_extra() || category.keeps_extra(*field))
        .collect();

    Harmonized { table, unresolved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_categories, default_primary_aliases};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn drops_extras_for_categories_that_do_not_keep_them() {
        let drone = default_categories()
            .into_iter()
            .find(|c| c.name == "Drone")
            .unwrap();
        let raw = Table::from_rows(
            strings(&["Sample Name", "Council", "Scat ID"]),
            vec![strings(&["a", "Noosa", "S1"])],
        );
        let harmonized = harmonize(raw, &default_primary_aliases(), &drone);
        assert_eq!(harmonized.table.headers(), &strings(&["Sample.Name"])[..]);
        assert!(!harmonized.unresolved.contains(&CanonicalField::Council));
        assert!(!harmonized.unresolved.contains(&CanonicalField::ScatId));
    }
}
