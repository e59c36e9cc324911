use simd_json::OwnedValue;
use std::collections::BTreeMap;

use crate::decoder::json_text;
use crate::error::CouchError;

const DESIGN_PREFIX: &str = "_design/";
const ALL_DOCS: &str = "_all_docs";
const CHANGES: &str = "_changes";

/// How stale a view index may be when it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stale {
    Ok,
    UpdateAfter,
}

impl Stale {
    fn as_str(self) -> &'static str {
        match self {
            Stale::Ok => "ok",
            Stale::UpdateAfter => "update_after",
        }
    }
}

/// Parameters of a view, list or `_all_docs` query.
///
/// Keys are sent JSON encoded, so `key("a")` becomes `key="a"` on the wire. Composite
/// keys can be built with [`simd_json::json!`].
#[derive(Debug, Clone)]
pub struct ViewQuery {
    design_doc: Option<String>,
    view_name: Option<String>,
    list_name: Option<String>,
    all_docs: bool,
    key: Option<OwnedValue>,
    keys: Vec<OwnedValue>,
    start_key: Option<OwnedValue>,
    start_doc_id: Option<String>,
    end_key: Option<OwnedValue>,
    end_doc_id: Option<String>,
    stale: Option<Stale>,
    descending: bool,
    group: bool,
    group_level: Option<u32>,
    reduce: bool,
    include_docs: bool,
    inclusive_end: bool,
    update_seq: bool,
    limit: Option<u64>,
    skip: Option<u64>,
    extra: BTreeMap<String, String>,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            design_doc: None,
            view_name: None,
            list_name: None,
            all_docs: false,
            key: None,
            keys: Vec::new(),
            start_key: None,
            start_doc_id: None,
            end_key: None,
            end_doc_id: None,
            stale: None,
            descending: false,
            group: false,
            group_level: None,
            reduce: true,
            include_docs: false,
            inclusive_end: true,
            update_seq: false,
            limit: None,
            skip: None,
            extra: BTreeMap::new(),
        }
    }
}

impl ViewQuery {
    /// Query of `view_name` in the design document `design_doc` (with or without the
    /// `_design/` prefix).
    pub fn new(design_doc: impl Into<String>, view_name: impl Into<String>) -> Self {
        Self::default().design_doc(design_doc).view_name(view_name)
    }

    /// Query of the `_all_docs` index.
    pub fn all_docs() -> Self {
        Self {
            all_docs: true,
            ..Self::default()
        }
    }

    pub fn design_doc(mut self, design_doc: impl Into<String>) -> Self {
        let design_doc = design_doc.into();
        let name = design_doc
            .strip_prefix(DESIGN_PREFIX)
            .map(str::to_owned)
            .unwrap_or(design_doc);
        self.design_doc = Some(name);
        self
    }

    pub fn view_name(mut self, view_name: impl Into<String>) -> Self {
        self.view_name = Some(view_name.into());
        self
    }

    /// Runs the view through the list function `list_name`.
    pub fn list_name(mut self, list_name: impl Into<String>) -> Self {
        self.list_name = Some(list_name.into());
        self
    }

    pub fn key(mut self, key: impl Into<OwnedValue>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Several keys at once. The query is then sent as a POST with a `keys` body.
    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<OwnedValue>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn start_key(mut self, key: impl Into<OwnedValue>) -> Self {
        self.start_key = Some(key.into());
        self
    }

    pub fn start_doc_id(mut self, id: impl Into<String>) -> Self {
        self.start_doc_id = Some(id.into());
        self
    }

    pub fn end_key(mut self, key: impl Into<OwnedValue>) -> Self {
        self.end_key = Some(key.into());
        self
    }

    pub fn end_doc_id(mut self, id: impl Into<String>) -> Self {
        self.end_doc_id = Some(id.into());
        self
    }

    pub fn stale(mut self, stale: Stale) -> Self {
        self.stale = Some(stale);
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    pub fn group(mut self, group: bool) -> Self {
        self.group = group;
        self
    }

    pub fn group_level(mut self, level: u32) -> Self {
        self.group_level = Some(level);
        self
    }

    pub fn reduce(mut self, reduce: bool) -> Self {
        self.reduce = reduce;
        self
    }

    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    pub fn inclusive_end(mut self, inclusive_end: bool) -> Self {
        self.inclusive_end = inclusive_end;
        self
    }

    pub fn update_seq(mut self, update_seq: bool) -> Self {
        self.update_seq = update_seq;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Adds a raw parameter. It overrides a typed setting of the same name.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    pub fn has_multiple_keys(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Path of the query below the database, one entry per URL segment.
    pub fn path_segments(&self) -> Result<Vec<String>, CouchError> {
        if self.all_docs {
            return Ok(vec![ALL_DOCS.to_owned()]);
        }
        let (Some(design_doc), Some(view_name)) = (
            self.design_doc.as_deref().filter(|s| !s.is_empty()),
            self.view_name.as_deref().filter(|s| !s.is_empty()),
        ) else {
            return Err(CouchError::Config(
                "a view query needs a non-empty design document and view name".to_owned(),
            ));
        };
        let mut segments = vec!["_design".to_owned(), design_doc.to_owned()];
        match &self.list_name {
            Some(list_name) => {
                segments.push("_list".to_owned());
                segments.push(list_name.clone());
            }
            None => segments.push("_view".to_owned()),
        }
        segments.push(view_name.to_owned());
        Ok(segments)
    }

    /// Query string parameters, sorted by name. Only non-default settings are emitted.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = BTreeMap::new();
        let mut put = |name: &str, value: String| {
            params.insert(name.to_owned(), value);
        };
        if let Some(key) = &self.key {
            put("key", json_text(key));
        }
        if let Some(key) = &self.start_key {
            put("startkey", json_text(key));
        }
        if let Some(id) = &self.start_doc_id {
            put("startkey_docid", id.clone());
        }
        if let Some(key) = &self.end_key {
            put("endkey", json_text(key));
        }
        if let Some(id) = &self.end_doc_id {
            put("endkey_docid", id.clone());
        }
        if let Some(stale) = self.stale {
            put("stale", stale.as_str().to_owned());
        }
        if self.descending {
            put("descending", "true".to_owned());
        }
        if !self.inclusive_end {
            put("inclusive_end", "false".to_owned());
        }
        if !self.reduce {
            put("reduce", "false".to_owned());
        }
        if self.include_docs {
            put("include_docs", "true".to_owned());
        }
        if self.group {
            put("group", "true".to_owned());
        }
        if self.update_seq {
            put("update_seq", "true".to_owned());
        }
        if let Some(limit) = self.limit {
            put("limit", limit.to_string());
        }
        if let Some(skip) = self.skip {
            put("skip", skip.to_string());
        }
        if let Some(level) = self.group_level {
            put("group_level", level.to_string());
        }
        for (name, value) in &self.extra {
            put(name, value.clone());
        }
        params.into_iter().collect()
    }

    /// JSON body of a multi-key query.
    pub fn keys_body(&self) -> String {
        let keys: Vec<String> = self.keys.iter().map(json_text).collect();
        format!("{{\"keys\":[{}]}}", keys.join(","))
    }
}

/// Parameters of a `_changes` request.
#[derive(Debug, Clone, Default)]
pub struct ChangesQuery {
    doc_ids: Option<Vec<String>>,
    conflicts: bool,
    descending: bool,
    feed: Option<String>,
    filter: Option<String>,
    heartbeat: Option<u64>,
    include_docs: bool,
    attachments: bool,
    att_encoding_info: bool,
    last_event_id: Option<u64>,
    limit: Option<u64>,
    since: Option<String>,
    style: Option<String>,
    timeout: Option<u64>,
    view: Option<String>,
}

impl ChangesQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn doc_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.doc_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn conflicts(mut self, conflicts: bool) -> Self {
        self.conflicts = conflicts;
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    /// `normal`, `longpoll`, `continuous` or `eventsource`.
    pub fn feed(mut self, feed: impl Into<String>) -> Self {
        self.feed = Some(feed.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Milliseconds between newlines sent on an idle feed.
    pub fn heartbeat(mut self, heartbeat: u64) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    pub fn attachments(mut self, attachments: bool) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn att_encoding_info(mut self, att_encoding_info: bool) -> Self {
        self.att_encoding_info = att_encoding_info;
        self
    }

    pub fn last_event_id(mut self, id: u64) -> Self {
        self.last_event_id = Some(id);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume point, usually the `last_seq` of a previous response.
    pub fn since(mut self, since: impl ToString) -> Self {
        self.since = Some(since.to_string());
        self
    }

    /// `main_only` or `all_docs`.
    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn path_segments(&self) -> Vec<String> {
        vec![CHANGES.to_owned()]
    }

    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = BTreeMap::new();
        let mut put = |name: &str, value: String| {
            params.insert(name.to_owned(), value);
        };
        if let Some(ids) = &self.doc_ids {
            let ids: Vec<String> = ids
                .iter()
                .map(|id| json_text(&OwnedValue::from(id.as_str())))
                .collect();
            put("doc_ids", format!("[{}]", ids.join(",")));
        }
        if self.conflicts {
            put("conflicts", "true".to_owned());
        }
        if self.descending {
            put("descending", "true".to_owned());
        }
        if let Some(feed) = &self.feed {
            put("feed", feed.clone());
        }
        if let Some(filter) = &self.filter {
            put("filter", filter.clone());
        }
        if let Some(heartbeat) = self.heartbeat {
            put("heartbeat", heartbeat.to_string());
        }
        if self.include_docs {
            put("include_docs", "true".to_owned());
        }
        if self.attachments {
            put("attachments", "true".to_owned());
        }
        if self.att_encoding_info {
            put("att_encoding_info", "true".to_owned());
        }
        if let Some(id) = self.last_event_id {
            put("last-event-id", id.to_string());
        }
        if let Some(limit) = self.limit {
            put("limit", limit.to_string());
        }
        if let Some(since) = &self.since {
            put("since", since.clone());
        }
        if let Some(style) = &self.style {
            put("style", style.clone());
        }
        if let Some(timeout) = self.timeout {
            put("timeout", timeout.to_string());
        }
        if let Some(view) = &self.view {
            put("view", view.clone());
        }
        params.into_iter().collect()
    }
}
