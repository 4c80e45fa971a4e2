// Join Candidate Generator
//
// Proposes join keys between two tables in three tiers: joins confirmed
// earlier (catalog), declared foreign keys, then name heuristics. Proposals
// are advisory; nothing here decides which join a query uses.

use serde::Deserialize;
use std::collections::HashSet;

use crate::models::{
    CatalogSide, ColumnMetadata, JoinCatalogEntry, JoinSuggestion, JoinType, SuggestionOrigin, TableMetadata,
};

/// Thresholds and per-rule confidences for suggestions
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionConfig {
    /// Suggestions below this confidence are dropped
    pub min_confidence: f64,
    /// Same column name on both sides (other than a bare `id`)
    pub exact_name_confidence: f64,
    /// `<singular table>_id` on one side, `id` on the other
    pub key_convention_confidence: f64,
    /// `id` on both sides
    pub bare_id_confidence: f64,
    pub fuzzy_confidence: f64,
    /// 0 disables fuzzy name matching
    pub fuzzy_max_edit_distance: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            exact_name_confidence: 0.8,
            key_convention_confidence: 0.9,
            bare_id_confidence: 0.4,
            fuzzy_confidence: 0.6,
            fuzzy_max_edit_distance: 2,
        }
    }
}

/// Naive English singular, enough for table names like `customers`,
/// `categories` or `addresses`
fn singular(table: &str) -> String {
    let lower = table.to_lowercase();
    if let Some(stem) = lower.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = lower.strip_suffix("sses") {
        format!("{}ss", stem)
    } else if lower.ends_with('s') && !lower.ends_with("ss") {
        lower[..lower.len() - 1].to_string()
    } else {
        lower
    }
}

/// The column of `target` that `from` declares as its foreign key target
fn referenced_column<'t>(from: &ColumnMetadata, target: &'t TableMetadata) -> Option<&'t ColumnMetadata> {
    let reference = from.reference.as_ref()?;
    let same_table = reference.foreign_table == target.table_name
        && (reference.foreign_schema.is_empty() || reference.foreign_schema == target.schema_name);
    if same_table {
        target.column(&reference.foreign_column)
    } else {
        None
    }
}

fn side(table: &TableMetadata, column: &ColumnMetadata) -> CatalogSide {
    CatalogSide::new(
        table.data_source_id.clone(),
        table.schema_name.clone(),
        table.table_name.clone(),
        column.name.clone(),
    )
}

/// A heuristic match before it becomes a suggestion
struct Candidate<'a> {
    left: &'a ColumnMetadata,
    right: &'a ColumnMetadata,
    confidence: f64,
    distance: usize,
    reason: String,
}

pub struct JoinCandidateGenerator {
    config: SuggestionConfig,
}

impl JoinCandidateGenerator {
    pub fn new(config: SuggestionConfig) -> Self {
        Self { config }
    }

    /// Catalog entries still valid for the current schemas. Entries must
    /// already be oriented with `left` on the left.
    pub fn catalog_suggestions(
        &self,
        entries: &[JoinCatalogEntry],
        left_hash: &str,
        right_hash: &str,
    ) -> Vec<JoinSuggestion> {
        entries
            .iter()
            .filter(|e| e.left_schema_hash == left_hash && e.right_schema_hash == right_hash)
            .map(|e| JoinSuggestion {
                left: e.left.clone(),
                right: e.right.clone(),
                join_type: e.join_type,
                confidence: 1.0,
                origin: SuggestionOrigin::Catalog,
                catalog_entry_id: Some(e.id.clone()),
                usage_count: Some(e.usage_count),
                reason: format!("Confirmed {} time(s) before", e.usage_count),
            })
            .collect()
    }

    /// Declared foreign keys between the two tables, in either direction.
    /// Only meaningful inside one source.
    pub fn foreign_key_suggestions(&self, left: &TableMetadata, right: &TableMetadata) -> Vec<JoinSuggestion> {
        if left.data_source_id != right.data_source_id {
            return Vec::new();
        }

        let mut out = Vec::new();
        for column in &left.columns {
            if let Some(target) = referenced_column(column, right) {
                out.push(self.fk_suggestion(left, column, right, target));
            }
        }
        for column in &right.columns {
            if let Some(target) = referenced_column(column, left) {
                out.push(self.fk_suggestion(left, target, right, column));
            }
        }
        out
    }

    fn fk_suggestion(
        &self,
        left: &TableMetadata,
        left_column: &ColumnMetadata,
        right: &TableMetadata,
        right_column: &ColumnMetadata,
    ) -> JoinSuggestion {
        JoinSuggestion {
            left: side(left, left_column),
            right: side(right, right_column),
            join_type: JoinType::Inner,
            confidence: 1.0,
            origin: SuggestionOrigin::ForeignKey,
            catalog_entry_id: None,
            usage_count: None,
            reason: format!(
                "Foreign key {}.{} -> {}.{}",
                left.table_name, left_column.name, right.table_name, right_column.name
            ),
        }
    }

    /// Best rule for one column pair, if any applies
    fn score<'a>(
        &self,
        left: &TableMetadata,
        l: &'a ColumnMetadata,
        right: &TableMetadata,
        r: &'a ColumnMetadata,
    ) -> Option<Candidate<'a>> {
        if !l.data_type.is_join_compatible(&r.data_type) {
            return None;
        }

        let (ln, rn) = (l.name.to_lowercase(), r.name.to_lowercase());
        let candidate = |confidence: f64, distance: usize, reason: String| Candidate {
            left: l,
            right: r,
            confidence,
            distance,
            reason,
        };

        if rn == "id" && ln == format!("{}_id", singular(&right.table_name)) {
            return Some(candidate(
                self.config.key_convention_confidence,
                0,
                format!("{} names the key of {}", l.name, right.table_name),
            ));
        }
        if ln == "id" && rn == format!("{}_id", singular(&left.table_name)) {
            return Some(candidate(
                self.config.key_convention_confidence,
                0,
                format!("{} names the key of {}", r.name, left.table_name),
            ));
        }
        if ln == rn {
            let confidence = if ln == "id" {
                self.config.bare_id_confidence
            } else {
                self.config.exact_name_confidence
            };
            return Some(candidate(confidence, 0, format!("Both tables have a column '{}'", l.name)));
        }

        let max = self.config.fuzzy_max_edit_distance;
        if max > 0 && ln.len() > max && rn.len() > max {
            let distance = strsim::levenshtein(&ln, &rn);
            if distance <= max {
                return Some(candidate(
                    self.config.fuzzy_confidence,
                    distance,
                    format!("'{}' and '{}' differ by {} edit(s)", l.name, r.name, distance),
                ));
            }
        }

        None
    }

    /// Name-based candidates, best first; ties go to the smaller edit
    /// distance, then the earlier columns
    pub fn heuristic_suggestions(&self, left: &TableMetadata, right: &TableMetadata) -> Vec<JoinSuggestion> {
        let mut candidates: Vec<Candidate> = left
            .columns
            .iter()
            .flat_map(|l| right.columns.iter().filter_map(move |r| self.score(left, l, right, r)))
            .collect();

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.distance.cmp(&b.distance))
                .then(a.left.ordinal_position.cmp(&b.left.ordinal_position))
                .then(a.right.ordinal_position.cmp(&b.right.ordinal_position))
        });

        candidates
            .into_iter()
            .map(|c| JoinSuggestion {
                left: side(left, c.left),
                right: side(right, c.right),
                join_type: JoinType::Inner,
                confidence: c.confidence,
                origin: SuggestionOrigin::Heuristic,
                catalog_entry_id: None,
                usage_count: None,
                reason: c.reason,
            })
            .collect()
    }

    /// All tiers in rank order. A column pair proposed by a higher tier is
    /// not repeated lower down, and everything under the floor is dropped.
    pub fn combine(
        &self,
        catalog: Vec<JoinSuggestion>,
        left: &TableMetadata,
        right: &TableMetadata,
    ) -> Vec<JoinSuggestion> {
        if left.columns.is_empty() || right.columns.is_empty() {
            return catalog
                .into_iter()
                .filter(|s| s.confidence >= self.config.min_confidence)
                .collect();
        }

        let mut seen: HashSet<(String, String)> = HashSet::new();
        catalog
            .into_iter()
            .chain(self.foreign_key_suggestions(left, right))
            .chain(self.heuristic_suggestions(left, right))
            .filter(|s| s.confidence >= self.config.min_confidence)
            .filter(|s| seen.insert((s.left.column.clone(), s.right.column.clone())))
            .collect()
    }
}

impl Default for JoinCandidateGenerator {
    fn default() -> Self {
        Self::new(SuggestionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnReference, DataType, SourceType, TableType};
    use chrono::Utc;

    fn customers() -> TableMetadata {
        TableMetadata::new("a", SourceType::Postgres, "public", "customers", TableType::BaseTable)
            .with_column("id", DataType::Integer)
            .with_column("email", DataType::Text)
            .with_column("region_code", DataType::Text)
    }

    fn orders(source: &str) -> TableMetadata {
        TableMetadata::new(source, SourceType::Postgres, "public", "orders", TableType::BaseTable)
            .with_column("id", DataType::Integer)
            .with_column("customer_id", DataType::Integer)
            .with_column("email", DataType::Text)
            .with_column("region_cd", DataType::Text)
            .with_column("placed_at", DataType::Timestamp)
    }

    fn pairs(suggestions: &[JoinSuggestion]) -> Vec<(&str, &str)> {
        suggestions
            .iter()
            .map(|s| (s.left.column.as_str(), s.right.column.as_str()))
            .collect()
    }

    #[test]
    fn test_fuzzy_match_respects_edit_distance() {
        let within = JoinCandidateGenerator::default().heuristic_suggestions(&customers(), &orders("b"));
        let fuzzy = within.iter().find(|s| s.left.column == "region_code").unwrap();
        assert_eq!(fuzzy.right.column, "region_cd");
        assert_eq!(fuzzy.confidence, 0.6);
        assert!(fuzzy.reason.contains("2 edit(s)"), "{}", fuzzy.reason);

        let strict = JoinCandidateGenerator::new(SuggestionConfig {
            fuzzy_max_edit_distance: 1,
            ..SuggestionConfig::default()
        });
        let suggestions = strict.heuristic_suggestions(&customers(), &orders("b"));
        assert!(suggestions.iter().all(|s| s.left.column != "region_code"));

        // Distance counts characters, not bytes
        let left = TableMetadata::new("a", SourceType::Postgres, "public", "stores", TableType::BaseTable)
            .with_column("straße_nr", DataType::Text);
        let right = TableMetadata::new("b", SourceType::Postgres, "public", "depots", TableType::BaseTable)
            .with_column("strasse_nr", DataType::Text);
        let suggestions = strict.heuristic_suggestions(&left, &right);
        assert!(suggestions.is_empty(), "ß to ss is two edits");
        let suggestions = JoinCandidateGenerator::default().heuristic_suggestions(&left, &right);
        assert_eq!(pairs(&suggestions), vec![("straße_nr", "strasse_nr")]);
    }

    #[test]
    fn test_singular() {
        assert_eq!(singular("customers"), "customer");
        assert_eq!(singular("Categories"), "category");
        assert_eq!(singular("addresses"), "address");
        assert_eq!(singular("glass"), "glass");
    }

    #[test]
    fn test_heuristic_ranking() {
        let generator = JoinCandidateGenerator::default();
        let suggestions = generator.heuristic_suggestions(&customers(), &orders("b"));

        assert_eq!(
            pairs(&suggestions),
            vec![
                ("id", "customer_id"),
                ("email", "email"),
                ("region_code", "region_cd"),
                ("id", "id"),
            ]
        );
        assert_eq!(suggestions[0].confidence, 0.9);
        assert!(suggestions.iter().all(|s| s.origin == SuggestionOrigin::Heuristic));
    }

    #[test]
    fn test_floor_and_fuzzy_switch() {
        let generator = JoinCandidateGenerator::new(SuggestionConfig {
            fuzzy_max_edit_distance: 0,
            ..SuggestionConfig::default()
        });
        let combined = generator.combine(Vec::new(), &customers(), &orders("b"));
        assert_eq!(pairs(&combined), vec![("id", "customer_id"), ("email", "email")]);
    }

    #[test]
    fn test_incompatible_types_never_match() {
        let left = TableMetadata::new("a", SourceType::Postgres, "public", "events", TableType::BaseTable)
            .with_column("placed_at", DataType::Boolean);
        let generator = JoinCandidateGenerator::default();
        assert!(generator.heuristic_suggestions(&left, &orders("b")).is_empty());
    }

    fn with_customer_fk(mut orders: TableMetadata) -> TableMetadata {
        orders.columns[1].reference = Some(ColumnReference {
            schema: "public".to_string(),
            table: "orders".to_string(),
            column: "customer_id".to_string(),
            foreign_schema: "public".to_string(),
            foreign_table: "customers".to_string(),
            foreign_column: "id".to_string(),
        });
        orders
    }

    #[test]
    fn test_foreign_keys_and_deduplication() {
        let local_orders = with_customer_fk(orders("a"));
        let generator = JoinCandidateGenerator::default();
        let combined = generator.combine(Vec::new(), &customers(), &local_orders);
        assert_eq!(combined[0].origin, SuggestionOrigin::ForeignKey);
        assert_eq!(pairs(&combined)[0], ("id", "customer_id"));
        assert_eq!(combined.iter().filter(|s| s.left.column == "id" && s.right.column == "customer_id").count(), 1);

        // Foreign keys never cross sources
        assert!(generator
            .foreign_key_suggestions(&customers(), &with_customer_fk(orders("b")))
            .is_empty());
    }

    #[test]
    fn test_catalog_entries_need_matching_hashes() {
        let entry = JoinCatalogEntry {
            id: "e1".to_string(),
            left: CatalogSide::new("a", "public", "customers", "email"),
            right: CatalogSide::new("b", "public", "orders", "email"),
            join_type: JoinType::Left,
            usage_count: 3,
            created_by: None,
            created_at: Utc::now(),
            left_schema_hash: "ha".to_string(),
            right_schema_hash: "hb".to_string(),
        };
        let generator = JoinCandidateGenerator::default();

        assert!(generator.catalog_suggestions(&[entry.clone()], "ha", "changed").is_empty());

        let catalog = generator.catalog_suggestions(&[entry], "ha", "hb");
        let combined = generator.combine(catalog, &customers(), &orders("b"));
        assert_eq!(combined[0].origin, SuggestionOrigin::Catalog);
        assert_eq!(combined[0].usage_count, Some(3));
        assert_eq!(combined.iter().filter(|s| s.left.column == "email").count(), 1);
    }

    #[test]
    fn test_empty_columns_yield_nothing() {
        let empty = TableMetadata::new("a", SourceType::Document, "public", "blobs", TableType::Collection);
        let generator = JoinCandidateGenerator::default();
        assert!(generator.combine(Vec::new(), &empty, &orders("b")).is_empty());
    }
}
