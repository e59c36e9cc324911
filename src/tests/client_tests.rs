#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde::{Deserialize, Serialize};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::tests::support::{CHANGES_PAYLOAD, VIEW_PAYLOAD};
    use crate::{
        ChangesQuery, ClientConfig, CouchDbClient, CouchError, DocumentIdentity, ViewQuery,
    };
    use bytes::Bytes;

    type Recorded = Arc<Mutex<Vec<String>>>;

    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Recorded) {
        serve_with_headers(responses.into_iter().map(|(status, body)| (status, "", body)).collect()).await
    }

    /// Serves one canned response per connection, in order, and records each request
    /// line followed by its body. Extra header lines must end with `\r\n`.
    async fn serve_with_headers(responses: Vec<(u16, &'static str, &'static str)>) -> (String, Recorded) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let recorded: Recorded = Arc::default();
        let log = Arc::clone(&recorded);
        tokio::spawn(async move {
            for (status, headers, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                let is_head = request.starts_with("HEAD ");
                log.lock().unwrap().push(request);
                let payload = if is_head { "" } else { body };
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n{headers}Content-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                    if is_head { body.len() } else { payload.len() }
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        (url, recorded)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            data.extend_from_slice(&chunk[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if n == 0 {
                break data.len();
            }
        };
        let head = String::from_utf8_lossy(&data[..header_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while data.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
        }
        let request_line = head.lines().next().unwrap_or_default().to_owned();
        let body = String::from_utf8_lossy(&data[header_end..]).to_string();
        format!("{request_line}\n{body}")
    }

    fn client(url: &str) -> CouchDbClient {
        let config = ClientConfig {
            max_retry_attempts: 2,
            retry_base_delay_ms: 1,
            ..ClientConfig::new(url)
        };
        CouchDbClient::new(config).unwrap()
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Note {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
        rev: Option<String>,
        text: String,
    }

    impl DocumentIdentity for Note {
        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        fn set_id(&mut self, id: String) {
            self.id = Some(id);
        }

        fn rev(&self) -> Option<&str> {
            self.rev.as_deref()
        }

        fn set_rev(&mut self, rev: String) {
            self.rev = Some(rev);
        }
    }

    #[tokio::test]
    async fn test_streaming_view_over_http() {
        let (url, recorded) = serve(vec![(200, VIEW_PAYLOAD)]).await;
        let client = client(&url);
        let query = ViewQuery::new("app", "by_name").limit(2);
        let mut result = client.query_for_streaming_view("db", &query).await.unwrap();
        assert_eq!(result.total_rows(), 2);
        let mut ids = Vec::new();
        let mut rows = result.iterator().unwrap();
        while rows.has_next().await.unwrap() {
            ids.push(rows.next_row().await.unwrap().id().unwrap());
        }
        assert_eq!(ids, vec!["a", "b"]);
        result.close();

        let requests = recorded.lock().unwrap();
        assert!(requests[0].starts_with("GET /db/_design/app/_view/by_name?limit=2 "));
    }

    #[tokio::test]
    async fn test_multi_key_view_is_posted() {
        let (url, recorded) = serve(vec![(200, VIEW_PAYLOAD)]).await;
        let query = ViewQuery::all_docs().keys(["a", "b"]);
        let view = client(&url).query_view("db", &query).await.unwrap();
        assert_eq!(view.rows.len(), 2);

        let requests = recorded.lock().unwrap();
        assert!(requests[0].starts_with("POST /db/_all_docs "));
        assert!(requests[0].ends_with(r#"{"keys":["a","b"]}"#));
    }

    #[tokio::test]
    async fn test_changes_over_http() {
        let (url, recorded) = serve(vec![(200, CHANGES_PAYLOAD)]).await;
        let query = ChangesQuery::new().since("0");
        let changes = client(&url).query_changes("db", &query).await.unwrap();
        assert_eq!(changes.changes.len(), 1);
        assert_eq!(changes.last_seq.as_deref(), Some("1"));
        assert!(recorded.lock().unwrap()[0].starts_with("GET /db/_changes?since=0 "));
    }

    #[tokio::test]
    async fn test_missing_document() {
        let not_found = r#"{"error":"not_found","reason":"missing"}"#;
        let (url, _) = serve(vec![(404, not_found), (404, not_found)]).await;
        let client = client(&url);
        let note: Option<Note> = client.get("db", "nope").await.unwrap();
        assert!(note.is_none());
        match client.find::<Note>("db", "nope").await {
            Err(CouchError::Status { status, error, reason }) => {
                assert_eq!(status, 404);
                assert_eq!(error, "not_found");
                assert_eq!(reason, "missing");
            }
            other => panic!("expected a 404, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_database_conflict_is_false() {
        let (url, _) = serve(vec![(412, r#"{"error":"file_exists","reason":"exists"}"#)]).await;
        assert!(!client(&url).create_database("db").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_uses_head() {
        let (url, recorded) = serve(vec![(200, "{}"), (404, "")]).await;
        let client = client(&url);
        assert!(client.exists("db").await.unwrap());
        assert!(!client.exists("other").await.unwrap());
        assert!(recorded.lock().unwrap()[0].starts_with("HEAD /db "));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let (url, recorded) = serve(vec![
            (503, r#"{"error":"unavailable","reason":"busy"}"#),
            (200, r#"{"db_name":"db","doc_count":3,"update_seq":12}"#),
        ])
        .await;
        let info = client(&url).database_info("db").await.unwrap();
        assert_eq!(info.db_name, "db");
        assert_eq!(info.doc_count, 3);
        assert_eq!(info.update_seq.as_deref(), Some("12"));
        assert_eq!(recorded.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let (url, recorded) = serve(vec![(400, r#"{"error":"bad_request","reason":"no"}"#)]).await;
        let err = client(&url).all_databases().await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(recorded.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_writes_identity_back() {
        let (url, recorded) = serve(vec![(201, r#"{"ok":true,"id":"n1","rev":"1-x"}"#)]).await;
        let mut note = Note {
            text: "hi".to_owned(),
            ..Default::default()
        };
        let response = client(&url).create("db", &mut note).await.unwrap();
        assert!(response.ok);
        assert_eq!(note.id.as_deref(), Some("n1"));
        assert_eq!(note.rev.as_deref(), Some("1-x"));
        let requests = recorded.lock().unwrap();
        assert!(requests[0].starts_with("POST /db "));
        assert!(requests[0].ends_with(r#"{"text":"hi"}"#));
    }

    #[tokio::test]
    async fn test_delete_sends_revision() {
        let (url, recorded) = serve(vec![(200, r#"{"ok":true,"id":"_design/app","rev":"2-y"}"#)]).await;
        let mut note = Note {
            id: Some("_design/app".to_owned()),
            rev: Some("1-x".to_owned()),
            text: String::new(),
        };
        client(&url).delete("db", &mut note).await.unwrap();
        assert_eq!(note.rev.as_deref(), Some("2-y"));
        assert!(recorded.lock().unwrap()[0].starts_with("DELETE /db/_design/app?rev=1-x "));
    }

    #[tokio::test]
    async fn test_bulk_update_and_uuids() {
        let (url, _) = serve(vec![
            (201, r#"[{"id":"a","rev":"1-a"},{"id":"b","error":"conflict","reason":"Document update conflict."}]"#),
            (200, r#"{"uuids":["u1","u2"]}"#),
        ])
        .await;
        let client = client(&url);
        let notes = vec![Note::default(), Note::default()];
        let result = client.bulk_update("db", &notes).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.failures().count(), 1);
        assert_eq!(client.uuids(2).await.unwrap(), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_invalid_arguments_send_nothing() {
        let client = client("http://127.0.0.1:9/");
        assert!(matches!(
            client.database_info("").await,
            Err(CouchError::InvalidArgument(_))
        ));
        let mut note = Note::default();
        assert!(matches!(
            client.update("db", &mut note).await,
            Err(CouchError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.query_view("db", &ViewQuery::default()).await,
            Err(CouchError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_contains_as_latest_compares_etag() {
        let (url, recorded) = serve_with_headers(vec![
            (200, "ETag: \"2-b\"\r\n", ""),
            (200, "ETag: \"3-c\"\r\n", ""),
            (404, "", ""),
        ])
        .await;
        let client = client(&url);
        assert!(client.contains_as_latest("db", "n1", "2-b").await.unwrap());
        assert!(!client.contains_as_latest("db", "n1", "2-b").await.unwrap());
        assert!(!client.contains_as_latest("db", "gone", "1-a").await.unwrap());
        assert!(recorded.lock().unwrap()[0].starts_with("HEAD /db/n1 "));
    }

    #[tokio::test]
    async fn test_get_attachment_streams_content() {
        let (url, recorded) = serve(vec![(200, "attached bytes"), (200, "older bytes")]).await;
        let client = client(&url);

        let mut attachment = client.get_attachment("db", "n1", None, "note.txt").await.unwrap();
        assert_eq!(attachment.content_type.as_deref(), Some("application/json"));
        assert_eq!(attachment.content_length, Some(14));
        let mut content = Vec::new();
        attachment.body.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"attached bytes");

        let mut older = client.get_attachment("db", "n1", Some("1-a"), "note.txt").await.unwrap();
        let mut content = String::new();
        older.body.read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "older bytes");

        let requests = recorded.lock().unwrap();
        assert!(requests[0].starts_with("GET /db/n1/note.txt "));
        assert!(requests[1].starts_with("GET /db/n1/note.txt?rev=1-a "));
    }

    #[tokio::test]
    async fn test_create_attachment_puts_content() {
        let (url, recorded) = serve(vec![(201, r#"{"ok":true,"id":"n1","rev":"2-b"}"#)]).await;
        let response = client(&url)
            .create_attachment("db", "n1", Some("1-a"), "note.txt", "text/plain", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.rev, "2-b");
        let requests = recorded.lock().unwrap();
        assert!(requests[0].starts_with("PUT /db/n1/note.txt?rev=1-a "));
        assert!(requests[0].ends_with("\nhello"));
    }

    #[tokio::test]
    async fn test_create_with_explicit_id() {
        let (url, recorded) = serve(vec![(201, r#"{"ok":true,"id":"chosen","rev":"1-x"}"#)]).await;
        let mut note = Note {
            id: Some("ignored".to_owned()),
            text: "hi".to_owned(),
            ..Default::default()
        };
        client(&url).create_with_id("db", Some("chosen"), &mut note).await.unwrap();
        assert_eq!(note.id.as_deref(), Some("chosen"));
        assert_eq!(note.rev.as_deref(), Some("1-x"));
        assert!(recorded.lock().unwrap()[0].starts_with("PUT /db/chosen "));
    }
}
