//! The four statement compilers.

use crate::literal::{escape_text, literal};
use chrono::{DateTime, SecondsFormat, Utc};
use mapmend_core::FieldSet;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Page size of the compiled pending-report listing.
pub const LIST_PAGE_SIZE: usize = 10;

const PREFIXES: &str = "\
PREFIX mm: <https://mapmend.org/vocab#>
PREFIX schema: <http://schema.org/>
PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>
";

/// Named graphs and IRI bases the compiler targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNames {
    /// Graph holding unmerged reports and their review status.
    pub staging: String,
    /// Graph holding the authoritative POI dataset.
    pub canonical: String,
    /// Base IRI that target ids resolve against.
    pub poi_base: String,
    /// Base IRI that report refs resolve against.
    pub report_base: String,
}

impl Default for GraphNames {
    fn default() -> Self {
        GraphNames {
            staging: "https://mapmend.org/graph/staging".to_string(),
            canonical: "https://mapmend.org/graph/canonical".to_string(),
            poi_base: "https://mapmend.org/poi/".to_string(),
            report_base: "https://mapmend.org/report/".to_string(),
        }
    }
}

impl GraphNames {
    fn poi_iri(&self, target_id: &str) -> String {
        format!("<{}{}>", self.poi_base, target_id)
    }

    fn report_iri(&self, report_ref: &str) -> String {
        format!("<{}{}>", self.report_base, report_ref)
    }
}

/// Compiles field sets into SPARQL text for one pair of named graphs.
#[derive(Debug, Clone, Default)]
pub struct StatementCompiler {
    graphs: GraphNames,
}

impl StatementCompiler {
    pub fn new(graphs: GraphNames) -> Self {
        StatementCompiler { graphs }
    }

    pub fn graphs(&self) -> &GraphNames {
        &self.graphs
    }

    /// `INSERT DATA` creating a pending report in the staging graph: one
    /// report node linked to the target plus one triple per non-empty field.
    pub fn insert_staging(
        &self,
        report_ref: &str,
        target_id: &str,
        proposer: &str,
        fields: &FieldSet,
        timestamp: DateTime<Utc>,
    ) -> String {
        let report = self.graphs.report_iri(report_ref);
        let poi = self.graphs.poi_iri(target_id);

        let mut props = vec![
            "a mm:CorrectionReport".to_string(),
            format!("mm:about {poi}"),
            format!("mm:submittedBy \"{}\"", escape_text(proposer)),
            format!(
                "mm:submittedAt \"{}\"^^xsd:dateTime",
                timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            "mm:reviewStatus \"pending\"".to_string(),
        ];
        for (field, value) in fields.iter() {
            props.push(format!("{} {}", field.predicate(), literal(value)));
        }

        let mut out = String::from(PREFIXES);
        let _ = writeln!(&mut out, "INSERT DATA {{");
        let _ = writeln!(&mut out, "  GRAPH <{}> {{", self.graphs.staging);
        let _ = writeln!(&mut out, "    {report} {} .", props.join(" ;\n        "));
        let _ = writeln!(&mut out, "  }}");
        let _ = write!(&mut out, "}}");
        out
    }

    /// `DELETE`/`INSERT`/`WHERE` replacing, in the canonical graph, exactly
    /// the predicates present in `fields`. Untouched predicates survive; a
    /// target that does not exist as a canonical POI makes the whole
    /// statement a no-op.
    pub fn merge_canonical(&self, target_id: &str, fields: &FieldSet) -> String {
        let poi = self.graphs.poi_iri(target_id);
        let graph = &self.graphs.canonical;

        let mut deletes = String::new();
        let mut inserts = String::new();
        let mut optionals = String::new();
        for (i, (field, value)) in fields.iter().enumerate() {
            let pred = field.predicate();
            let _ = writeln!(&mut deletes, "    {poi} {pred} ?old{i} .");
            let _ = writeln!(&mut inserts, "    {poi} {pred} {} .", literal(value));
            let _ = writeln!(&mut optionals, "    OPTIONAL {{ {poi} {pred} ?old{i} . }}");
        }

        let mut out = String::from(PREFIXES);
        let _ = writeln!(&mut out, "DELETE {{");
        let _ = writeln!(&mut out, "  GRAPH <{graph}> {{");
        let _ = write!(&mut out, "{deletes}");
        let _ = writeln!(&mut out, "  }}");
        let _ = writeln!(&mut out, "}}");
        let _ = writeln!(&mut out, "INSERT {{");
        let _ = writeln!(&mut out, "  GRAPH <{graph}> {{");
        let _ = write!(&mut out, "{inserts}");
        let _ = writeln!(&mut out, "  }}");
        let _ = writeln!(&mut out, "}}");
        let _ = writeln!(&mut out, "WHERE {{");
        let _ = writeln!(&mut out, "  GRAPH <{graph}> {{");
        // Requiring the type triple keeps the merge a no-op for unknown
        // targets; the OPTIONALs let first-time predicates insert cleanly.
        let _ = writeln!(&mut out, "    {poi} a mm:PointOfInterest .");
        let _ = write!(&mut out, "{optionals}");
        let _ = writeln!(&mut out, "  }}");
        let _ = write!(&mut out, "}}");
        out
    }

    /// Replace a report's review-status tag in the staging graph.
    pub fn status_update(&self, report_ref: &str, new_status: &str) -> String {
        let report = self.graphs.report_iri(report_ref);
        let graph = &self.graphs.staging;

        let mut out = String::from(PREFIXES);
        let _ = writeln!(
            &mut out,
            "DELETE {{ GRAPH <{graph}> {{ {report} mm:reviewStatus ?status . }} }}"
        );
        let _ = writeln!(
            &mut out,
            "INSERT {{ GRAPH <{graph}> {{ {report} mm:reviewStatus \"{}\" . }} }}",
            escape_text(new_status)
        );
        let _ = write!(
            &mut out,
            "WHERE  {{ GRAPH <{graph}> {{ {report} mm:reviewStatus ?status . }} }}"
        );
        out
    }

    /// Read-only listing of pending reports, newest first, optionally
    /// filtered to one target, capped at [`LIST_PAGE_SIZE`].
    pub fn list_pending(&self, target_id: Option<&str>) -> String {
        let graph = &self.graphs.staging;

        let mut out = String::from(PREFIXES);
        let _ = writeln!(&mut out, "SELECT ?report ?poi ?submittedAt WHERE {{");
        let _ = writeln!(&mut out, "  GRAPH <{graph}> {{");
        let _ = writeln!(&mut out, "    ?report a mm:CorrectionReport ;");
        let _ = writeln!(&mut out, "            mm:about ?poi ;");
        let _ = writeln!(&mut out, "            mm:submittedAt ?submittedAt ;");
        let _ = writeln!(&mut out, "            mm:reviewStatus \"pending\" .");
        let _ = writeln!(&mut out, "  }}");
        if let Some(target) = target_id {
            let _ = writeln!(&mut out, "  FILTER (?poi = {})", self.graphs.poi_iri(target));
        }
        let _ = writeln!(&mut out, "}}");
        let _ = writeln!(&mut out, "ORDER BY DESC(?submittedAt)");
        let _ = write!(&mut out, "LIMIT {LIST_PAGE_SIZE}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: Vec<(&str, serde_json::Value)>) -> FieldSet {
        FieldSet::from_pairs(pairs.into_iter().map(|(k, v)| (k.to_string(), v))).unwrap()
    }

    fn compiler() -> StatementCompiler {
        StatementCompiler::new(GraphNames::default())
    }

    #[test]
    fn staging_insert_carries_status_and_fields() {
        let stmt = compiler().insert_staging(
            "report-1",
            "poi_1",
            "user-a",
            &fields(vec![
                ("telephone", json!("0123")),
                ("accessible_toilet", json!(true)),
            ]),
            Utc::now(),
        );
        assert!(stmt.starts_with("PREFIX mm:"));
        assert!(stmt.contains("INSERT DATA"));
        assert!(stmt.contains("GRAPH <https://mapmend.org/graph/staging>"));
        assert!(stmt.contains("<https://mapmend.org/report/report-1>"));
        assert!(stmt.contains("mm:about <https://mapmend.org/poi/poi_1>"));
        assert!(stmt.contains("mm:reviewStatus \"pending\""));
        assert!(stmt.contains("schema:telephone \"0123\""));
        assert!(stmt.contains("mm:accessibleToilet true"));
    }

    #[test]
    fn merge_touches_only_proposed_predicates() {
        let stmt = compiler().merge_canonical("poi_1", &fields(vec![("telephone", json!("0123"))]));
        assert!(stmt.contains("schema:telephone ?old0"));
        assert!(stmt.contains("schema:telephone \"0123\""));
        // Untouched predicates never appear in the DELETE template.
        assert!(!stmt.contains("schema:email"));
        assert!(!stmt.contains("schema:openingHours"));
    }

    #[test]
    fn merge_requires_existing_canonical_entity() {
        let stmt = compiler().merge_canonical("poi_1", &fields(vec![("telephone", json!("0123"))]));
        assert!(stmt.contains("a mm:PointOfInterest ."));
        assert!(stmt.contains("OPTIONAL { <https://mapmend.org/poi/poi_1> schema:telephone ?old0 . }"));
    }

    #[test]
    fn merge_types_each_literal_per_field() {
        let stmt = compiler().merge_canonical(
            "poi_1",
            &fields(vec![
                ("accessible_toilet", json!(false)),
                ("price_level", json!(3)),
                ("note", json!("has a \"step\"")),
            ]),
        );
        assert!(stmt.contains("mm:accessibleToilet false ."));
        assert!(stmt.contains("mm:priceLevel 3 ."));
        assert!(stmt.contains("mm:note \"has a \\\"step\\\"\" ."));
    }

    #[test]
    fn status_update_swaps_the_tag() {
        let stmt = compiler().status_update("report-1", "approved");
        assert!(stmt.contains("DELETE { GRAPH <https://mapmend.org/graph/staging> { <https://mapmend.org/report/report-1> mm:reviewStatus ?status . } }"));
        assert!(stmt.contains("mm:reviewStatus \"approved\""));
    }

    #[test]
    fn listing_is_newest_first_and_capped() {
        let all = compiler().list_pending(None);
        assert!(all.contains("ORDER BY DESC(?submittedAt)"));
        assert!(all.ends_with(&format!("LIMIT {LIST_PAGE_SIZE}")));
        assert!(!all.contains("FILTER"));

        let one = compiler().list_pending(Some("poi_7"));
        assert!(one.contains("FILTER (?poi = <https://mapmend.org/poi/poi_7>)"));
    }
}
