//! The canonical query catalogue: a fixed table of parameterized templates
//! compiled into engine `select` parameters. Placeholders are positional
//! `{}` markers substituted in a fixed order per query; no placeholder may
//! survive substitution. Q13 never made it into the catalogue, so the
//! table holds fourteen concrete templates.

use solr_client::SelectParams;

/// Substitutes `args` into successive `{}` markers. Braces that open Solr
/// local-params (`{!term ...}`) are left alone; only the exact `{}` pair
/// is a placeholder.
fn fill(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    for arg in args {
        match rest.find("{}") {
            Some(pos) => {
                out.push_str(&rest[..pos]);
                out.push_str(arg);
                rest = &rest[pos + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    debug_assert!(!out.contains("{}"), "unfilled placeholder in '{out}'");
    out
}

/// The process-wide catalogue. Stateless and immutable; customization
/// composes a template with arguments into a concrete parameter map.
#[derive(Debug, Clone, Copy, Default)]
pub struct Catalogue;

impl Catalogue {
    /// Q1: doc-topic distribution of a document, by id.
    pub fn q1(&self, doc_id: &str, model_name: &str) -> SelectParams {
        SelectParams {
            q: fill("id:{}", &[doc_id]),
            fl: Some(fill("doctpc_{}", &[model_name])),
            ..Default::default()
        }
    }

    /// Q2: registry lookup behind the metadata-field listing.
    pub fn q2(&self, corpus_name: &str) -> SelectParams {
        SelectParams {
            q: fill("corpus_name:{}", &[corpus_name]),
            fl: Some("fields".to_string()),
            ..Default::default()
        }
    }

    /// Q3: document count of a collection.
    pub fn q3(&self) -> SelectParams {
        SelectParams {
            q: "*:*".to_string(),
            rows: Some("0".to_string()),
            ..Default::default()
        }
    }

    /// Q4: documents whose weight on a topic is at least a threshold.
    pub fn q4(
        &self,
        model_name: &str,
        threshold: &str,
        topic: &str,
        start: &str,
        rows: &str,
    ) -> SelectParams {
        SelectParams {
            q: fill(
                "{!payload_check f=doctpc_{} payloads='{}' op='gte'}t{}",
                &[model_name, threshold, topic],
            ),
            fl: Some(fill("id,doctpc_{}", &[model_name])),
            start: Some(start.to_string()),
            rows: Some(rows.to_string()),
            ..Default::default()
        }
    }

    /// Q5: documents scored against a doc-topic payload vector.
    pub fn q5(&self, model_name: &str, thetas: &str, start: &str, rows: &str) -> SelectParams {
        SelectParams {
            q: fill("{!vp f=doctpc_{} vector=\"{}\"}", &[model_name, thetas]),
            fl: Some("id,score".to_string()),
            start: Some(start.to_string()),
            rows: Some(rows.to_string()),
            ..Default::default()
        }
    }

    /// Q6: metadata of a document, restricted to the given fields.
    pub fn q6(&self, doc_id: &str, meta_fields: &str) -> SelectParams {
        SelectParams {
            q: fill("id:{}", &[doc_id]),
            fl: Some(meta_fields.to_string()),
            ..Default::default()
        }
    }

    /// Q7: documents whose field contains a string.
    pub fn q7(
        &self,
        search_field: &str,
        needle: &str,
        start: &str,
        rows: &str,
    ) -> SelectParams {
        SelectParams {
            q: fill("{}:{}", &[search_field, needle]),
            fl: Some("id".to_string()),
            start: Some(start.to_string()),
            rows: Some(rows.to_string()),
            ..Default::default()
        }
    }

    /// Q8: label of every topic in a model.
    pub fn q8(&self, start: &str, rows: &str) -> SelectParams {
        SelectParams {
            q: "*:*".to_string(),
            fl: Some("id,tpc_labels".to_string()),
            start: Some(start.to_string()),
            rows: Some(rows.to_string()),
            ..Default::default()
        }
    }

    /// Q9: top documents of a topic.
    pub fn q9(&self, model_name: &str, topic: &str, start: &str, rows: &str) -> SelectParams {
        SelectParams {
            q: fill("{!term f=doctpc_{}}t{}", &[model_name, topic]),
            fl: Some(fill("id,doctpc_{}", &[model_name])),
            start: Some(start.to_string()),
            rows: Some(rows.to_string()),
            ..Default::default()
        }
    }

    /// Q10: full per-topic information of a model.
    pub fn q10(&self, start: &str, rows: &str) -> SelectParams {
        SelectParams {
            q: "*:*".to_string(),
            fl: Some(
                "id,betas,vocab,alphas,topic_entropy,topic_coherence,\
                 ndocs_active,tpc_descriptions,tpc_labels,coords"
                    .to_string(),
            ),
            start: Some(start.to_string()),
            rows: Some(rows.to_string()),
            ..Default::default()
        }
    }

    /// Q11: word distribution of a topic, by topic index.
    pub fn q11(&self, topic: &str) -> SelectParams {
        SelectParams {
            q: fill("id:t{}", &[topic]),
            fl: Some("betas".to_string()),
            ..Default::default()
        }
    }

    /// Q12: topics scored against a topic-word payload vector.
    pub fn q12(&self, betas: &str, start: &str, rows: &str) -> SelectParams {
        SelectParams {
            q: fill("{!vp f=betas vector=\"{}\"}", &[betas]),
            fl: Some("id,score".to_string()),
            start: Some(start.to_string()),
            rows: Some(rows.to_string()),
            ..Default::default()
        }
    }

    /// Q14: documents scored against a caller-provided payload vector.
    /// Same shape as Q5; the vector comes from outside instead of Q1.
    pub fn q14(&self, model_name: &str, thetas: &str, start: &str, rows: &str) -> SelectParams {
        self.q5(model_name, thetas, start, rows)
    }

    /// Q15: lemmas of a document, by id.
    pub fn q15(&self, doc_id: &str) -> SelectParams {
        SelectParams {
            q: fill("id:{}", &[doc_id]),
            fl: Some("all_lemmas".to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_filled(params: &SelectParams) {
        let survives = |s: &Option<String>| s.as_deref().map_or(false, |s| s.contains("{}"));
        assert!(!params.q.contains("{}"), "q retains a placeholder: {}", params.q);
        assert!(!survives(&params.fl));
        assert!(!survives(&params.fq));
        assert!(!survives(&params.sort));
        assert!(!survives(&params.start));
        assert!(!survives(&params.rows));
    }

    #[test]
    fn every_template_fills_completely() {
        let c = Catalogue;
        let all = vec![
            c.q1("D1", "mallet-25"),
            c.q2("cordis"),
            c.q3(),
            c.q4("mallet-25", "100", "3", "0", "10"),
            c.q5("mallet-25", "t0|500 t1|500", "0", "10"),
            c.q6("D1", "id,title,date"),
            c.q7("title", "photovoltaic", "0", "10"),
            c.q8("0", "25"),
            c.q9("mallet-25", "3", "0", "10"),
            c.q10("0", "25"),
            c.q11("3"),
            c.q12("energy|400 grid|600", "0", "25"),
            c.q14("mallet-25", "t2|1000", "0", "10"),
            c.q15("D1"),
        ];
        for params in &all {
            assert_filled(params);
        }
    }

    #[test]
    fn q4_composes_the_payload_check_local_params() {
        let params = Catalogue.q4("mallet-25", "100", "3", "0", "10");
        assert_eq!(
            params.q,
            "{!payload_check f=doctpc_mallet-25 payloads='100' op='gte'}t3"
        );
        assert_eq!(params.fl.as_deref(), Some("id,doctpc_mallet-25"));
    }

    #[test]
    fn q5_embeds_the_vector_in_quotes() {
        let params = Catalogue.q5("mallet-25", "t0|334 t1|333 t2|333", "0", "5");
        assert_eq!(
            params.q,
            "{!vp f=doctpc_mallet-25 vector=\"t0|334 t1|333 t2|333\"}"
        );
        assert_eq!(params.fl.as_deref(), Some("id,score"));
    }

    #[test]
    fn q9_composes_the_term_query() {
        let params = Catalogue.q9("mallet-25", "7", "0", "10");
        assert_eq!(params.q, "{!term f=doctpc_mallet-25}t7");
    }

    #[test]
    fn q11_prefixes_the_topic_index() {
        assert_eq!(Catalogue.q11("4").q, "id:t4");
    }
}
