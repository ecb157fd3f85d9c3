//! SPARQL statements for the MICO annotation store (Marmotta) and the
//! formats its SELECT endpoint answers in.

pub mod results;

pub use results::{SelectResults, Term};

pub const MMM: &str = "http://www.mico-project.eu/ns/mmm/2.0/schema#";
pub const MMMTERMS: &str = "http://www.mico-project.eu/ns/mmmterms/2.0/schema#";
pub const FAM: &str = "http://vocab.fusepool.info/fam#";
pub const OA: &str = "http://www.w3.org/ns/oa#";
pub const DCT: &str = "http://purl.org/dc/terms/";
pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// Binding names shared by the selector queries.
pub const ANNOTATION_VAR: &str = "annotation";
pub const SELECTOR_VAR: &str = "selector";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a valid IRI reference: {0:?}")]
pub struct InvalidIri(pub String);

/// Wraps `uri` as `<uri>`, refusing anything that would escape the IRIREF production.
pub fn iri(uri: &str) -> Result<String, InvalidIri> {
    let forbidden = |c: char| {
        c.is_control() || c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\')
    };
    if uri.is_empty() || uri.chars().any(forbidden) {
        return Err(InvalidIri(uri.to_string()));
    }
    Ok(format!("<{}>", uri))
}

fn prologue(prefixes: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (prefix, ns) in prefixes {
        out.push_str(&format!("PREFIX {}: <{}>\n", prefix, ns));
    }
    out.push('\n');
    out
}

fn selectors_by_body(item_uri: &str, body_type: &str) -> Result<String, InvalidIri> {
    let item = iri(item_uri)?;
    Ok(format!(
        "{prologue}SELECT DISTINCT ?{annotation} ?{selector} WHERE {{\n  \
         {item} mmm:hasPart ?{annotation} .\n  \
         ?{annotation} mmm:hasBody ?body ;\n    mmm:hasTarget ?target .\n  \
         ?body a mmmterms:{body_type} .\n  \
         ?target oa:hasSelector ?fragment .\n  \
         ?fragment rdf:value ?{selector} .\n}}",
        prologue = prologue(&[("mmm", MMM), ("mmmterms", MMMTERMS), ("oa", OA), ("rdf", RDF)]),
        annotation = ANNOTATION_VAR,
        selector = SELECTOR_VAR,
        item = item,
        body_type = body_type,
    ))
}

/// Shot boundaries detected by temporal video segmentation.
pub fn shot_boundaries(item_uri: &str) -> Result<String, InvalidIri> {
    selectors_by_body(item_uri, "TVSShotBoundaryFrameBody")
}

/// Face boxes; their selectors carry `#xywh=` rather than a time range.
pub fn face_detections(item_uri: &str) -> Result<String, InvalidIri> {
    selectors_by_body(item_uri, "FaceDetectionBody")
}

/// Time ranges of the shot or key frame a face annotation's frame was taken from.
pub fn temporal_fragments(face_annotation_uri: &str) -> Result<String, InvalidIri> {
    let face = iri(face_annotation_uri)?;
    Ok(format!(
        "{prologue}SELECT DISTINCT ?{selector} WHERE {{\n  \
         {face} mmm:hasTarget ?faceTarget .\n  \
         ?faceTarget oa:hasSource ?frame .\n  \
         ?frame dct:source ?{annotation} .\n  \
         ?{annotation} mmm:hasBody ?body ;\n    mmm:hasTarget ?target .\n  \
         {{ ?body a mmmterms:TVSShotBoundaryFrameBody }} UNION {{ ?body a mmmterms:TVSKeyFrameBody }}\n  \
         ?target oa:hasSelector ?fragment .\n  \
         ?fragment rdf:value ?{selector} .\n}}",
        prologue = prologue(&[
            ("mmm", MMM),
            ("mmmterms", MMMTERMS),
            ("oa", OA),
            ("dct", DCT),
            ("rdf", RDF)
        ]),
        annotation = ANNOTATION_VAR,
        selector = SELECTOR_VAR,
        face = face,
    ))
}

/// Linked entities and topics found in an item. Topic rows leave `?type` unbound.
pub fn entity_mentions(item_uri: &str) -> Result<String, InvalidIri> {
    let item = iri(item_uri)?;
    Ok(format!(
        "{prologue}SELECT ?label ?entityReference ?type ?confidence WHERE {{ {{\n  \
         {item} mmm:hasPart [ mmm:hasBody [\n    \
         a <{fam}LinkedEntity> ;\n    \
         fam:entity-label ?label ;\n    \
         fam:entity-reference ?entityReference ;\n    \
         fam:entity-type ?type ;\n    \
         fam:confidence ?confidence\n  ] ]\n\
         }} UNION {{\n  \
         {item} mmm:hasPart [ mmm:hasBody [\n    \
         a <{fam}TopicAnnotation> ;\n    \
         fam:topic-label ?label ;\n    \
         fam:topic-reference ?entityReference ;\n    \
         fam:confidence ?confidence\n  ] ]\n\
         }} }}",
        prologue = prologue(&[("mmm", MMM), ("fam", FAM)]),
        fam = FAM,
        item = item,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = "http://demo2.mico-project.eu:8080/marmotta/de12b016-17d1-4613-85b9-055b797d1fa3";

    #[test]
    fn iri_wraps_valid_uris() {
        assert_eq!(iri("http://example.org/a#b").unwrap(), "<http://example.org/a#b>");
    }

    #[test]
    fn iri_rejects_injection() {
        assert!(iri("").is_err());
        assert!(iri("http://example.org/a> } DROP ALL { <x").is_err());
        assert!(iri("http://example.org/a b").is_err());
        assert!(iri("http://example.org/\"x\"").is_err());
    }

    #[test]
    fn iri_rejects_controls_and_unicode_whitespace() {
        for uri in ["http://x/a\u{7f}b", "http://x/a\u{85}b", "http://x/a\u{a0}b", "http://x/a\u{2028}b", "http://x/a\tb"] {
            assert!(iri(uri).is_err(), "{:?} accepted", uri);
        }
        assert_eq!(iri("http://x/caf\u{e9}").unwrap(), "<http://x/caf\u{e9}>");
    }

    #[test]
    fn shot_query_targets_item_and_body_type() {
        let q = shot_boundaries(ITEM).unwrap();
        assert!(q.contains(&format!("<{}> mmm:hasPart ?annotation", ITEM)));
        assert!(q.contains("mmmterms:TVSShotBoundaryFrameBody"));
        assert!(q.contains(&format!("PREFIX mmmterms: <{}>", MMMTERMS)));
        assert!(q.contains("SELECT DISTINCT ?annotation ?selector"));
    }

    #[test]
    fn face_query_uses_face_body() {
        let q = face_detections(ITEM).unwrap();
        assert!(q.contains("mmmterms:FaceDetectionBody"));
        assert!(!q.contains("TVSShotBoundaryFrameBody"));
    }

    #[test]
    fn temporal_query_accepts_shots_and_key_frames() {
        let q = temporal_fragments("http://example.org/face/1").unwrap();
        assert!(q.contains("<http://example.org/face/1> mmm:hasTarget ?faceTarget"));
        assert!(q.contains("TVSShotBoundaryFrameBody"));
        assert!(q.contains("TVSKeyFrameBody"));
        assert!(q.contains("dct:source"));
    }

    #[test]
    fn mention_query_unions_entities_and_topics() {
        let q = entity_mentions(ITEM).unwrap();
        assert_eq!(q.matches(&format!("<{}>", ITEM)).count(), 2);
        assert!(q.contains("SELECT ?label ?entityReference ?type ?confidence"));
        assert!(q.contains("<http://vocab.fusepool.info/fam#LinkedEntity>"));
        assert!(q.contains("<http://vocab.fusepool.info/fam#TopicAnnotation>"));
        assert!(q.contains("UNION"));
    }

    #[test]
    fn builders_refuse_bad_uris() {
        assert!(entity_mentions("bad uri").is_err());
        assert!(temporal_fragments("<x>").is_err());
    }
}
