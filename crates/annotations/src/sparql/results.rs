use serde::Deserialize;
use std::collections::HashMap;

/// `application/sparql-results+json` answer to a SELECT query.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectResults {
    pub head: Head,
    pub results: Bindings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Head {
    #[serde(default)]
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bindings {
    #[serde(default)]
    pub bindings: Vec<HashMap<String, Term>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Term {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(rename = "xml:lang")]
    pub lang: Option<String>,
    pub datatype: Option<String>,
}

impl SelectResults {
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    pub fn len(&self) -> usize {
        self.results.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.bindings.is_empty()
    }

    /// Values bound to `var`, in row order; rows leaving it unbound are skipped.
    pub fn values<'a>(&'a self, var: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.results
            .bindings
            .iter()
            .filter_map(move |row| row.get(var).map(|t| t.value.as_str()))
    }

    /// Pairs of values bound to `a` and `b` in the same row.
    pub fn pairs<'a>(&'a self, a: &'a str, b: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.results.bindings.iter().filter_map(move |row| {
            Some((row.get(a)?.value.as_str(), row.get(b)?.value.as_str()))
        })
    }
}

/// Rows of a `text/tab-separated-values` answer, header dropped.
pub fn tsv_rows(body: &str) -> impl Iterator<Item = Vec<&str>> {
    body.lines()
        .skip(1)
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(|line| line.split('\t').collect())
}

/// `"Paris"@en` becomes `Paris`; anything else comes back as given.
pub fn clean_label(label: &str) -> &str {
    let bytes = label.as_bytes();
    let n = bytes.len();
    // Shortest tagged literal is `""@xx`.
    if n >= 5
        && bytes[0] == b'"'
        && bytes[n - 4] == b'"'
        && bytes[n - 3] == b'@'
        && bytes[n - 2..].iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_')
    {
        return &label[1..n - 4];
    }
    label
}

/// `<http://…>` becomes `http://…`.
pub fn unwrap_iri(cell: &str) -> &str {
    cell.strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(cell)
}

/// Reads a numeric cell written bare (`0.8`), quoted (`"0.8"`) or typed
/// (`"0.8"^^<http://www.w3.org/2001/XMLSchema#double>`).
pub fn parse_number(cell: &str) -> Option<f64> {
    let lexical = match cell.strip_prefix('"') {
        Some(rest) => &rest[..rest.find('"')?],
        None => cell,
    };
    lexical.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
      "head": { "vars": ["annotation", "selector"] },
      "results": { "bindings": [
        { "annotation": { "type": "uri", "value": "http://x/a1" },
          "selector": { "type": "literal", "value": "http://x/p#t=npt:0,5" } },
        { "annotation": { "type": "uri", "value": "http://x/a2" } },
        { "annotation": { "type": "uri", "value": "http://x/a3" },
          "selector": { "type": "literal", "value": "http://x/p#t=npt:5,9", "datatype": "http://www.w3.org/2001/XMLSchema#string" } }
      ] }
    }"#;

    #[test]
    fn parses_json_bindings() {
        let results = SelectResults::from_json(JSON).unwrap();
        assert_eq!(results.head.vars, vec!["annotation", "selector"]);
        assert_eq!(results.len(), 3);

        let selectors: Vec<_> = results.values("selector").collect();
        assert_eq!(selectors, vec!["http://x/p#t=npt:0,5", "http://x/p#t=npt:5,9"]);

        let pairs: Vec<_> = results.pairs("annotation", "selector").collect();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0, "http://x/a3");
    }

    #[test]
    fn empty_results() {
        let results =
            SelectResults::from_json(r#"{"head":{"vars":[]},"results":{"bindings":[]}}"#).unwrap();
        assert!(results.is_empty());
        assert_eq!(results.values("selector").count(), 0);
    }

    #[test]
    fn rejects_non_results_json() {
        assert!(SelectResults::from_json("[]").is_err());
        assert!(SelectResults::from_json("<html>").is_err());
    }

    #[test]
    fn tsv_skips_header_and_blank_lines() {
        let body = "?a\t?b\r\nx\ty\r\n\r\nz\t\n";
        let rows: Vec<_> = tsv_rows(body).collect();
        assert_eq!(rows, vec![vec!["x", "y"], vec!["z", ""]]);
    }

    #[test]
    fn clean_label_strips_language_tag() {
        assert_eq!(clean_label("\"Paris\"@en"), "Paris");
        assert_eq!(clean_label("\"New \"York\"\"@de"), "New \"York\"");
        assert_eq!(clean_label("Paris"), "Paris");
        assert_eq!(clean_label("\"Paris\""), "\"Paris\"");
        assert_eq!(clean_label("\"Paris\"@en-GB"), "\"Paris\"@en-GB");
    }

    #[test]
    fn unwrap_iri_only_touches_bracketed_cells() {
        assert_eq!(unwrap_iri("<http://dbpedia.org/resource/Paris>"), "http://dbpedia.org/resource/Paris");
        assert_eq!(unwrap_iri("http://dbpedia.org/resource/Paris"), "http://dbpedia.org/resource/Paris");
        assert_eq!(unwrap_iri(""), "");
    }

    #[test]
    fn parse_number_forms() {
        assert_eq!(parse_number("0.8"), Some(0.8));
        assert_eq!(parse_number("1.0E0"), Some(1.0));
        assert_eq!(parse_number("\"0.25\""), Some(0.25));
        assert_eq!(
            parse_number("\"0.5\"^^<http://www.w3.org/2001/XMLSchema#double>"),
            Some(0.5)
        );
        assert_eq!(parse_number("high"), None);
        assert_eq!(parse_number("\"unterminated"), None);
        assert_eq!(parse_number("\"NaN\"^^<http://www.w3.org/2001/XMLSchema#double>"), None);
        assert_eq!(parse_number("INF"), None);
        assert_eq!(parse_number("-inf"), None);
    }
}
