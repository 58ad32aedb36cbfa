// ABOUTME: SELECT construction for table exports, applying filter overrides and row limits
// ABOUTME: Filtered tables use indexed left joins against their parent tables

use crate::table_rules::FilterOverride;
use crate::utils::quote_ident;

/// Build the SELECT used to export `table`
///
/// With a filter override the statement joins the table to each parent it may
/// reference and keeps rows whose set references resolve; otherwise it is a plain `SELECT *`. A `limit` appends `LIMIT n`
/// (`Some(0)` selects nothing, which is how empty samples are produced).
pub fn build_select_sql(
    table: &str,
    filter: Option<&FilterOverride>,
    limit: Option<usize>,
) -> String {
    let mut sql = match filter {
        Some(rule) => rule.select_sql(),
        None => format!("SELECT * FROM {}", quote_ident(table)),
    };
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_rules::ParentJoin;

    #[test]
    fn plain_select_quotes_table() {
        assert_eq!(build_select_sql("Words", None, None), r#"SELECT * FROM "Words""#);
        assert_eq!(
            build_select_sql("Words", None, Some(0)),
            r#"SELECT * FROM "Words" LIMIT 0"#
        );
    }

    #[test]
    fn filtered_select_uses_left_joins() {
        let rule = FilterOverride::new(
            "SynonymCache",
            vec![
                ParentJoin {
                    column: "word_id".into(),
                    parent_table: "Words".into(),
                    parent_column: "word_id".into(),
                },
                ParentJoin {
                    column: "synonym_word_id".into(),
                    parent_table: "Words".into(),
                    parent_column: "word_id".into(),
                },
            ],
        )
        .unwrap();

        let sql = build_select_sql("SynonymCache", Some(&rule), Some(10));
        assert_eq!(
            sql,
            concat!(
                r#"SELECT c.* FROM "SynonymCache" c"#,
                r#" LEFT JOIN "Words" p0 ON c."word_id" = p0."word_id""#,
                r#" LEFT JOIN "Words" p1 ON c."synonym_word_id" = p1."word_id""#,
                r#" WHERE (c."word_id" IS NULL OR p0."word_id" IS NOT NULL)"#,
                r#" AND (c."synonym_word_id" IS NULL OR p1."word_id" IS NOT NULL) LIMIT 10"#
            )
        );
    }
}
