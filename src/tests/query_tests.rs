#[cfg(test)]
mod tests {
    use simd_json::{json, OwnedValue};

    use crate::{ChangesQuery, CouchError, Stale, ViewQuery};

    fn pairs(params: &[(&str, &str)]) -> Vec<(String, String)> {
        params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_view_path_and_params() {
        let query = ViewQuery::new("_design/app", "by_name")
            .key("alice")
            .limit(10)
            .include_docs(true);
        assert_eq!(
            query.path_segments().unwrap(),
            vec!["_design", "app", "_view", "by_name"]
        );
        assert_eq!(
            query.params(),
            pairs(&[("include_docs", "true"), ("key", "\"alice\""), ("limit", "10")])
        );
    }

    #[test]
    fn test_defaults_emit_nothing() {
        let query = ViewQuery::new("app", "by_name");
        assert!(query.params().is_empty());
        assert!(!query.has_multiple_keys());
    }

    #[test]
    fn test_non_default_flags() {
        let query = ViewQuery::new("app", "counts")
            .reduce(false)
            .inclusive_end(false)
            .descending(true)
            .group_level(2)
            .stale(Stale::UpdateAfter)
            .start_key(json!(["a", 1]))
            .end_doc_id("zz")
            .skip(5);
        assert_eq!(
            query.params(),
            pairs(&[
                ("descending", "true"),
                ("endkey_docid", "zz"),
                ("group_level", "2"),
                ("inclusive_end", "false"),
                ("reduce", "false"),
                ("skip", "5"),
                ("stale", "update_after"),
                ("startkey", r#"["a",1]"#),
            ])
        );
    }

    #[test]
    fn test_extra_param_overrides() {
        let query = ViewQuery::new("app", "v").limit(3).param("limit", "4");
        assert_eq!(query.params(), pairs(&[("limit", "4")]));
    }

    #[test]
    fn test_list_and_all_docs_paths() {
        let list = ViewQuery::new("app", "by_name").list_name("as_csv");
        assert_eq!(
            list.path_segments().unwrap(),
            vec!["_design", "app", "_list", "as_csv", "by_name"]
        );
        assert_eq!(ViewQuery::all_docs().path_segments().unwrap(), vec!["_all_docs"]);
    }

    #[test]
    fn test_view_without_name_is_rejected() {
        let query = ViewQuery::default().design_doc("app");
        assert!(matches!(query.path_segments(), Err(CouchError::Config(_))));
        let empty = ViewQuery::new("", "v");
        assert!(matches!(empty.path_segments(), Err(CouchError::Config(_))));
    }

    #[test]
    fn test_keys_body() {
        let query = ViewQuery::all_docs().keys(vec![OwnedValue::from("a"), OwnedValue::from(1i64)]);
        assert!(query.has_multiple_keys());
        assert_eq!(query.keys_body(), r#"{"keys":["a",1]}"#);
    }

    #[test]
    fn test_changes_params() {
        let query = ChangesQuery::new()
            .since(5)
            .feed("longpoll")
            .include_docs(true)
            .doc_ids(["a", "b"])
            .heartbeat(1000);
        assert_eq!(query.path_segments(), vec!["_changes"]);
        assert_eq!(
            query.params(),
            pairs(&[
                ("doc_ids", r#"["a","b"]"#),
                ("feed", "longpoll"),
                ("heartbeat", "1000"),
                ("include_docs", "true"),
                ("since", "5"),
            ])
        );
        assert!(ChangesQuery::new().params().is_empty());
    }
}
