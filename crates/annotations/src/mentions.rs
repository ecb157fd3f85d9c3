use crate::fragment::Fragment;
use crate::sparql::results::{clean_label, parse_number, tsv_rows, unwrap_iri};

/// Turns the tab-separated answer to [`crate::sparql::entity_mentions`] into
/// topic and entity fragments. Rows with an empty type cell are topics.
pub fn parse_entity_mentions(tsv: &str) -> Vec<Fragment> {
    tsv_rows(tsv)
        .filter(|fields| fields.len() == 4)
        .filter_map(|fields| {
            let label = clean_label(fields[0]).to_string();
            let reference = unwrap_iri(fields[1]).to_string();
            let confidence = parse_number(fields[3])?;

            Some(if fields[2].is_empty() {
                Fragment::Topic {
                    label,
                    reference,
                    confidence,
                }
            } else {
                Fragment::Entity {
                    label,
                    reference,
                    entity_type: unwrap_iri(fields[2]).to_string(),
                    confidence,
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentKind;

    const RESPONSE: &str = "?label\t?entityReference\t?type\t?confidence\n\
        \"Barack Obama\"@en\t<http://dbpedia.org/resource/Barack_Obama>\t<http://dbpedia.org/ontology/Person>\t0.92\n\
        \"Washington\"@en\t<http://dbpedia.org/resource/Washington,_D.C.>\t<http://dbpedia.org/ontology/Place>\t\"0.71\"^^<http://www.w3.org/2001/XMLSchema#double>\n\
        \"Politics\"@en\t<http://dbpedia.org/resource/Category:Politics>\t\t0.4\n\
        broken row\n\
        \"Noise\"@en\t<http://x>\t\tnot-a-number\n";

    #[test]
    fn splits_topics_from_entities() {
        let fragments = parse_entity_mentions(RESPONSE);
        assert_eq!(fragments.len(), 3);

        let entities: Vec<_> = fragments
            .iter()
            .filter(|f| f.kind() == FragmentKind::Entity)
            .collect();
        assert_eq!(entities.len(), 2);

        assert_eq!(
            fragments[0],
            Fragment::Entity {
                label: "Barack Obama".into(),
                reference: "http://dbpedia.org/resource/Barack_Obama".into(),
                entity_type: "http://dbpedia.org/ontology/Person".into(),
                confidence: 0.92,
            }
        );
        assert_eq!(
            fragments[2],
            Fragment::Topic {
                label: "Politics".into(),
                reference: "http://dbpedia.org/resource/Category:Politics".into(),
                confidence: 0.4,
            }
        );
    }

    #[test]
    fn non_finite_confidence_rows_are_skipped() {
        let tsv = "?label\t?entityReference\t?type\t?confidence\n\
            \"Odd\"@en\t<http://dbpedia.org/resource/Odd>\t\t\"NaN\"^^<http://www.w3.org/2001/XMLSchema#double>\n\
            \"Even\"@en\t<http://dbpedia.org/resource/Even>\t\t0.3\n";
        let fragments = parse_entity_mentions(tsv);
        assert_eq!(fragments.len(), 1);
        assert!(matches!(&fragments[0], Fragment::Topic { label, .. } if label == "Even"));
    }

    #[test]
    fn header_only_yields_nothing() {
        assert!(parse_entity_mentions("?label\t?entityReference\t?type\t?confidence\n").is_empty());
        assert!(parse_entity_mentions("").is_empty());
    }
}
